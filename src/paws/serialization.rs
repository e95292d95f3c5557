//! serde 辅助函数：上游数据字段类型不保证，统一在这里做宽容反序列化

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 反序列化数组字段，处理 null 值
pub fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 宽容字符串反序列化：接受字符串、数字、布尔，其他情况（null/缺失/对象）返回空串
pub fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(lenient_string(v.as_ref()))
}

/// 宽容整数反序列化：接受数字或数字字符串，其他情况返回 0
pub fn deserialize_lenient_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(lenient_i32(v.as_ref()))
}

/// 照片字段反序列化：上游可能返回字符串数组、单个字符串或非法类型
///
/// 非字符串元素会被丢弃；完全取不到时返回空数组，由归一化层补占位图
pub fn deserialize_photo_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// 字符串列表反序列化：接受字符串数组或逗号分隔的单个字符串
pub fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| lenient_string(Some(&item)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(['，', ','])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

/// 从 JSON 对象中按 snake_case / camelCase 双命名取字符串，snake_case 优先
pub fn value_str_dual(obj: &Value, snake: &str, camel: &str) -> String {
    let v = obj.get(snake).or_else(|| obj.get(camel));
    lenient_string(v)
}

/// 从 JSON Value 中取宽容字符串
pub fn lenient_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// 从 JSON Value 中取宽容整数
pub fn lenient_i32(v: Option<&Value>) -> i32 {
    match v {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) as i32,
        Some(Value::String(s)) => {
            // 上游偶见 "3歲" / "3 years" 这类字符串，取前缀数字部分
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "deserialize_photo_list")]
        photos: Vec<String>,
        #[serde(default, deserialize_with = "deserialize_lenient_i32")]
        age: i32,
    }

    #[test]
    fn photo_list_tolerates_bad_shapes() {
        let p: Probe = serde_json::from_value(json!({"photos": "http://a/1.jpg"})).unwrap();
        assert_eq!(p.photos, vec!["http://a/1.jpg"]);

        let p: Probe = serde_json::from_value(json!({"photos": 42})).unwrap();
        assert!(p.photos.is_empty());

        let p: Probe = serde_json::from_value(json!({"photos": ["a", 1, null, "b"]})).unwrap();
        assert_eq!(p.photos, vec!["a", "b"]);
    }

    #[test]
    fn lenient_i32_accepts_number_strings() {
        let p: Probe = serde_json::from_value(json!({"age": "3歲"})).unwrap();
        assert_eq!(p.age, 3);
        let p: Probe = serde_json::from_value(json!({"age": 7})).unwrap();
        assert_eq!(p.age, 7);
        let p: Probe = serde_json::from_value(json!({"age": null})).unwrap();
        assert_eq!(p.age, 0);
    }

    #[test]
    fn dual_name_prefers_snake_case() {
        let obj = json!({"vaccine_name": "狂犬病", "vaccineName": "舊值"});
        assert_eq!(value_str_dual(&obj, "vaccine_name", "vaccineName"), "狂犬病");
        let obj = json!({"vaccineName": "三合一"});
        assert_eq!(value_str_dual(&obj, "vaccine_name", "vaccineName"), "三合一");
    }
}
