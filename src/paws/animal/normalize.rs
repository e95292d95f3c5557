//! 记录归一化层
//!
//! 把各上游来源的原始记录（字段可能缺失 / 为 null / 类型错误）映射成标准化形状。
//! 全部为纯函数：字段级问题降级为文档化的默认值，绝不让单条记录失败。

use crate::paws::animal::models::{
    Animal, AnimalStatus, AnimalType, FeedingSchedule, Gender, HealthRecord, PlaceRecord,
    PlaceSource, VaccinationRecord,
};
use crate::paws::serialization::{
    deserialize_lenient_i32, deserialize_lenient_string, deserialize_photo_list,
    deserialize_string_list, lenient_i32, lenient_string, value_str_dual,
};
use serde::Deserialize;
use serde_json::Value;

/// 缺失名称时的占位名
pub const UNNAMED_PLACEHOLDER: &str = "未命名動物";

/// 个性标签缺失时的默认标签
pub const DEFAULT_TRAIT: &str = "親人";

/// 固定猫种名单，品种字串与名单条目做大小写不敏感的双向子串匹配
const CAT_BREEDS: &[&str] = &[
    "貓",
    "米克斯貓",
    "波斯",
    "暹羅",
    "布偶",
    "英國短毛",
    "美國短毛",
    "蘇格蘭摺耳",
    "緬因",
    "孟加拉",
    "俄羅斯藍",
    "cat",
    "persian",
    "siamese",
    "ragdoll",
    "british shorthair",
    "american shorthair",
    "scottish fold",
    "maine coon",
    "bengal",
    "russian blue",
];

/// 按动物名生成占位图 URL
pub fn placeholder_photo_url(name: &str) -> String {
    let seed: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("https://api.dicebear.com/7.x/shapes/svg?seed={}", seed)
}

/// 主要领养动物库的原始记录（后端行存储或代理接口返回）
///
/// 所有字段都做宽容反序列化；嵌套聚合保留原始 JSON，
/// 在归一化时按 snake_case / camelCase 双命名解析
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAnimalRecord {
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub breed: String,
    #[serde(deserialize_with = "deserialize_lenient_i32")]
    pub age: i32,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub gender: String,
    #[serde(deserialize_with = "deserialize_photo_list")]
    pub photos: Vec<String>,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub description: String,
    #[serde(alias = "healthRecord")]
    pub health_record: Option<Value>,
    #[serde(alias = "feedingSchedule")]
    pub feeding_schedule: Option<Value>,
    #[serde(alias = "vaccinationRecords")]
    pub vaccination_records: Option<Value>,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub location: String,
    #[serde(alias = "personalityTraits", deserialize_with = "deserialize_string_list")]
    pub personality_traits: Vec<String>,
    #[serde(alias = "animalType", deserialize_with = "deserialize_lenient_string")]
    pub animal_type: String,
}

/// 归一化主要动物库记录
pub fn normalize_animal(raw: RawAnimalRecord) -> Animal {
    let name = if raw.name.is_empty() {
        UNNAMED_PLACEHOLDER.to_string()
    } else {
        raw.name
    };

    let photos = if raw.photos.is_empty() {
        vec![placeholder_photo_url(&name)]
    } else {
        raw.photos
    };

    let personality_traits = if raw.personality_traits.is_empty() {
        vec![DEFAULT_TRAIT.to_string()]
    } else {
        raw.personality_traits
    };

    let animal_type = parse_animal_type(&raw.animal_type)
        .unwrap_or_else(|| infer_animal_type_from_breed(&raw.breed));

    Animal {
        id: raw.id,
        name,
        breed: raw.breed,
        age: raw.age,
        gender: Gender::from_raw(&raw.gender),
        photos,
        description: raw.description,
        health_record: normalize_health_record(raw.health_record.as_ref()),
        feeding_schedule: normalize_feeding_schedule(raw.feeding_schedule.as_ref()),
        vaccination_records: normalize_vaccination_records(raw.vaccination_records.as_ref()),
        status: AnimalStatus::from_raw(&raw.status),
        location: raw.location,
        personality_traits,
        animal_type,
    }
}

/// 显式种类字段解析，空值或闭集之外返回 None 交给品种推断
fn parse_animal_type(raw: &str) -> Option<AnimalType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cat" | "貓" | "猫" => Some(AnimalType::Cat),
        "dog" | "狗" | "犬" => Some(AnimalType::Dog),
        _ => None,
    }
}

/// 品种推断：与固定猫种名单做大小写不敏感的双向子串匹配，命中为猫，其余为狗
pub fn infer_animal_type_from_breed(breed: &str) -> AnimalType {
    let breed = breed.trim().to_lowercase();
    if breed.is_empty() {
        return AnimalType::Dog;
    }
    let is_cat = CAT_BREEDS.iter().any(|entry| {
        let entry = entry.to_lowercase();
        breed.contains(&entry) || entry.contains(&breed)
    });
    if is_cat {
        AnimalType::Cat
    } else {
        AnimalType::Dog
    }
}

/// 剔除 "none"（不分大小写）与 "無" 哨兵值后的有意义健康状况列表
pub fn meaningful_conditions(conditions: Vec<String>) -> Vec<String> {
    conditions
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none") && c != "無" && c != "无")
        .collect()
}

fn normalize_health_record(raw: Option<&Value>) -> HealthRecord {
    let Some(raw) = raw.filter(|v| v.is_object()) else {
        return HealthRecord::default();
    };
    let conditions = raw
        .get("conditions")
        .map(string_list_from_value)
        .unwrap_or_default();
    HealthRecord {
        last_checkup: value_str_dual(raw, "last_checkup", "lastCheckup"),
        conditions: meaningful_conditions(conditions),
        notes: lenient_string(raw.get("notes")),
    }
}

fn normalize_feeding_schedule(raw: Option<&Value>) -> FeedingSchedule {
    let Some(raw) = raw.filter(|v| v.is_object()) else {
        return FeedingSchedule::default();
    };
    let times = raw.get("times_per_day").or_else(|| raw.get("timesPerDay"));
    FeedingSchedule {
        food_type: value_str_dual(raw, "food_type", "foodType"),
        times_per_day: lenient_i32(times),
        portion_size: value_str_dual(raw, "portion_size", "portionSize"),
        notes: lenient_string(raw.get("notes")),
    }
}

/// 疫苗记录聚合可能以 snake_case 或 camelCase 两种命名到达，snake_case 优先
fn normalize_vaccination_records(raw: Option<&Value>) -> Vec<VaccinationRecord> {
    let Some(Value::Array(entries)) = raw else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let vaccine_name = value_str_dual(entry, "vaccine_name", "vaccineName");
            if vaccine_name.is_empty() {
                return None;
            }
            let next_due = value_str_dual(entry, "next_due_date", "nextDueDate");
            Some(VaccinationRecord {
                vaccine_name,
                date_administered: value_str_dual(entry, "date_administered", "dateAdministered"),
                next_due_date: if next_due.is_empty() { None } else { Some(next_due) },
            })
        })
        .collect()
}

fn string_list_from_value(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.to_string())
            .collect(),
        Value::String(s) => s
            .split(['，', ','])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// 全国收容所开放资料的原始记录
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawShelterRecord {
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_id: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_kind: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_sex: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_colour: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_age: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_sterilization: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_bacterin: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_status: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_remark: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub animal_opendate: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub album_file: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub shelter_name: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub shelter_address: String,
}

/// 归一化收容所动物记录
///
/// 该资料集没有名字与品种栏位：名字落占位名，品种用毛色 + 种类拼出；
/// 年龄只有 ADULT / CHILD 枚举，映射为估计岁数
pub fn normalize_shelter_animal(raw: RawShelterRecord) -> Animal {
    let breed = format!("{}{}", raw.animal_colour.trim(), raw.animal_kind.trim())
        .trim()
        .to_string();
    let age = match raw.animal_age.trim() {
        "ADULT" => 3,
        "CHILD" => 1,
        other => lenient_i32(Some(&Value::String(other.to_string()))),
    };
    let status = match raw.animal_status.trim() {
        "ADOPTED" => AnimalStatus::Adopted,
        _ => AnimalStatus::Available,
    };

    let mut conditions = Vec::new();
    if raw.animal_sterilization.trim() == "T" {
        conditions.push("已絕育".to_string());
    }
    let mut vaccination_records = Vec::new();
    if raw.animal_bacterin.trim() == "T" {
        vaccination_records.push(VaccinationRecord {
            vaccine_name: "基礎疫苗".to_string(),
            date_administered: raw.animal_opendate.clone(),
            next_due_date: None,
        });
    }

    let name = UNNAMED_PLACEHOLDER.to_string();
    let photos = if raw.album_file.trim().is_empty() {
        vec![placeholder_photo_url(&name)]
    } else {
        vec![raw.album_file.trim().to_string()]
    };
    let animal_type =
        parse_animal_type(&raw.animal_kind).unwrap_or_else(|| infer_animal_type_from_breed(&breed));

    Animal {
        id: raw.animal_id,
        name,
        breed,
        age,
        gender: Gender::from_raw(&raw.animal_sex),
        photos,
        description: raw.animal_remark,
        health_record: HealthRecord {
            last_checkup: String::new(),
            conditions,
            notes: String::new(),
        },
        feeding_schedule: FeedingSchedule::default(),
        vaccination_records,
        status,
        location: if raw.shelter_name.is_empty() {
            raw.shelter_address
        } else {
            raw.shelter_name
        },
        personality_traits: vec![DEFAULT_TRAIT.to_string()],
        animal_type,
    }
}

/// 特约兽医院原始记录（北市开放资料，栏位为中文键名）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawHospitalRecord {
    #[serde(alias = "字號", deserialize_with = "deserialize_lenient_string")]
    pub license_no: String,
    #[serde(alias = "名稱", deserialize_with = "deserialize_lenient_string")]
    pub name: String,
    #[serde(alias = "縣市", alias = "行政區", deserialize_with = "deserialize_lenient_string")]
    pub district: String,
    #[serde(alias = "地址", deserialize_with = "deserialize_lenient_string")]
    pub address: String,
    #[serde(alias = "電話", deserialize_with = "deserialize_lenient_string")]
    pub phone: String,
}

pub fn normalize_hospital(raw: RawHospitalRecord) -> PlaceRecord {
    place_record(
        raw.license_no,
        raw.name,
        raw.district,
        raw.address,
        raw.phone,
        PlaceSource::Hospital,
    )
}

/// 宠物登记站原始记录
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRegistrationStationRecord {
    #[serde(alias = "編號", deserialize_with = "deserialize_lenient_string")]
    pub station_no: String,
    #[serde(alias = "機構名稱", deserialize_with = "deserialize_lenient_string")]
    pub name: String,
    #[serde(alias = "區別", alias = "行政區", deserialize_with = "deserialize_lenient_string")]
    pub district: String,
    #[serde(alias = "地址", deserialize_with = "deserialize_lenient_string")]
    pub address: String,
    #[serde(alias = "電話", deserialize_with = "deserialize_lenient_string")]
    pub phone: String,
}

pub fn normalize_registration_station(raw: RawRegistrationStationRecord) -> PlaceRecord {
    place_record(
        raw.station_no,
        raw.name,
        raw.district,
        raw.address,
        raw.phone,
        PlaceSource::RegistrationStation,
    )
}

/// 特定宠物业原始记录
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBusinessRecord {
    #[serde(alias = "許可證號", deserialize_with = "deserialize_lenient_string")]
    pub permit_no: String,
    #[serde(alias = "業者名稱", alias = "寵物業者", deserialize_with = "deserialize_lenient_string")]
    pub name: String,
    #[serde(alias = "行政區", deserialize_with = "deserialize_lenient_string")]
    pub district: String,
    #[serde(alias = "營業地址", alias = "地址", deserialize_with = "deserialize_lenient_string")]
    pub address: String,
    #[serde(alias = "電話", deserialize_with = "deserialize_lenient_string")]
    pub phone: String,
}

pub fn normalize_business(raw: RawBusinessRecord) -> PlaceRecord {
    place_record(
        raw.permit_no,
        raw.name,
        raw.district,
        raw.address,
        raw.phone,
        PlaceSource::Business,
    )
}

/// TAS 领养小站原始记录
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTasCenterRecord {
    #[serde(alias = "編號", deserialize_with = "deserialize_lenient_string")]
    pub center_no: String,
    #[serde(alias = "名稱", deserialize_with = "deserialize_lenient_string")]
    pub name: String,
    #[serde(alias = "行政區", deserialize_with = "deserialize_lenient_string")]
    pub district: String,
    #[serde(alias = "地址", deserialize_with = "deserialize_lenient_string")]
    pub address: String,
    #[serde(alias = "電話", deserialize_with = "deserialize_lenient_string")]
    pub phone: String,
}

pub fn normalize_tas_center(raw: RawTasCenterRecord) -> PlaceRecord {
    place_record(
        raw.center_no,
        raw.name,
        raw.district,
        raw.address,
        raw.phone,
        PlaceSource::TasCenter,
    )
}

/// 场所记录的统一收口：证号缺失时用名称当稳定 ID
fn place_record(
    id: String,
    name: String,
    district: String,
    address: String,
    phone: String,
    source: PlaceSource,
) -> PlaceRecord {
    let id = if id.is_empty() { name.clone() } else { id };
    PlaceRecord {
        id,
        name,
        district,
        address,
        phone,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_photos_and_none_conditions_get_defaults() {
        let raw: RawAnimalRecord = serde_json::from_value(json!({
            "id": "a-1",
            "name": "小黑",
            "breed": "米克斯",
            "photos": [],
            "health_record": {"conditions": ["None"], "last_checkup": "2024-01-02"}
        }))
        .unwrap();
        let animal = normalize_animal(raw);

        assert_eq!(animal.photos.len(), 1);
        assert!(animal.photos[0].contains("小黑"));
        assert!(animal.health_record.conditions.is_empty());
        assert_eq!(animal.health_record.last_checkup, "2024-01-02");
    }

    #[test]
    fn missing_name_and_traits_fall_back() {
        let raw: RawAnimalRecord = serde_json::from_value(json!({"id": "a-2"})).unwrap();
        let animal = normalize_animal(raw);
        assert_eq!(animal.name, UNNAMED_PLACEHOLDER);
        assert_eq!(animal.personality_traits, vec![DEFAULT_TRAIT.to_string()]);
        assert_eq!(animal.photos.len(), 1);
    }

    #[test]
    fn sentinel_conditions_are_dropped() {
        let conditions = vec![
            "NONE".to_string(),
            "無".to_string(),
            "心臟病".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(meaningful_conditions(conditions), vec!["心臟病".to_string()]);
    }

    #[test]
    fn animal_type_inferred_from_breed() {
        assert_eq!(infer_animal_type_from_breed("英國短毛貓"), AnimalType::Cat);
        assert_eq!(infer_animal_type_from_breed("PERSIAN"), AnimalType::Cat);
        assert_eq!(infer_animal_type_from_breed("柴犬"), AnimalType::Dog);
        assert_eq!(infer_animal_type_from_breed(""), AnimalType::Dog);
        // 双向子串：名单条目比品种字串长也要命中
        assert_eq!(infer_animal_type_from_breed("布偶"), AnimalType::Cat);
    }

    #[test]
    fn explicit_animal_type_wins_over_breed() {
        let raw: RawAnimalRecord = serde_json::from_value(json!({
            "id": "a-3",
            "breed": "米克斯",
            "animal_type": "cat"
        }))
        .unwrap();
        assert_eq!(normalize_animal(raw).animal_type, AnimalType::Cat);
    }

    #[test]
    fn out_of_enum_gender_and_status_collapse() {
        let raw: RawAnimalRecord = serde_json::from_value(json!({
            "id": "a-4",
            "gender": "???",
            "status": "遛遛中"
        }))
        .unwrap();
        let animal = normalize_animal(raw);
        assert_eq!(animal.gender, Gender::Unknown);
        assert_eq!(animal.status, AnimalStatus::Available);
    }

    #[test]
    fn vaccination_records_accept_both_naming_conventions() {
        let raw: RawAnimalRecord = serde_json::from_value(json!({
            "id": "a-5",
            "vaccination_records": [
                {"vaccine_name": "狂犬病", "date_administered": "2024-03-01"},
                {"vaccineName": "三合一", "dateAdministered": "2024-04-01", "nextDueDate": "2025-04-01"},
                {"note": "缺疫苗名，跳过"}
            ]
        }))
        .unwrap();
        let animal = normalize_animal(raw);
        assert_eq!(animal.vaccination_records.len(), 2);
        assert_eq!(animal.vaccination_records[0].vaccine_name, "狂犬病");
        assert_eq!(animal.vaccination_records[1].date_administered, "2024-04-01");
        assert_eq!(
            animal.vaccination_records[1].next_due_date.as_deref(),
            Some("2025-04-01")
        );
    }

    #[test]
    fn wrong_typed_photo_field_becomes_single_entry_or_placeholder() {
        let raw: RawAnimalRecord =
            serde_json::from_value(json!({"id": "a-6", "photos": "http://p/1.jpg"})).unwrap();
        assert_eq!(normalize_animal(raw).photos, vec!["http://p/1.jpg"]);

        let raw: RawAnimalRecord =
            serde_json::from_value(json!({"id": "a-7", "name": "阿花", "photos": 99})).unwrap();
        let animal = normalize_animal(raw);
        assert_eq!(animal.photos.len(), 1);
        assert!(animal.photos[0].contains("阿花"));
    }

    #[test]
    fn shelter_record_maps_to_canonical_animal() {
        let raw: RawShelterRecord = serde_json::from_value(json!({
            "animal_id": 123456,
            "animal_kind": "貓",
            "animal_sex": "F",
            "animal_colour": "黑白色",
            "animal_age": "ADULT",
            "animal_sterilization": "T",
            "animal_bacterin": "T",
            "animal_status": "OPEN",
            "animal_opendate": "2024-05-01",
            "album_file": "http://shelter/123456.jpg",
            "shelter_name": "臺北市動物之家"
        }))
        .unwrap();
        let animal = normalize_shelter_animal(raw);

        assert_eq!(animal.id, "123456");
        assert_eq!(animal.animal_type, AnimalType::Cat);
        assert_eq!(animal.gender, Gender::Female);
        assert_eq!(animal.age, 3);
        assert_eq!(animal.status, AnimalStatus::Available);
        assert_eq!(animal.photos, vec!["http://shelter/123456.jpg"]);
        assert_eq!(animal.health_record.conditions, vec!["已絕育".to_string()]);
        assert_eq!(animal.vaccination_records.len(), 1);
        assert_eq!(animal.location, "臺北市動物之家");
        assert_eq!(animal.name, UNNAMED_PLACEHOLDER);
    }

    #[test]
    fn hospital_record_maps_to_place() {
        let raw: RawHospitalRecord = serde_json::from_value(json!({
            "字號": "北市獸醫字第101號",
            "名稱": "快樂動物醫院",
            "行政區": "大安區",
            "地址": "臺北市大安區和平東路一段100號",
            "電話": "02-2345-6789"
        }))
        .unwrap();
        let place = normalize_hospital(raw);
        assert_eq!(place.id, "北市獸醫字第101號");
        assert_eq!(place.name, "快樂動物醫院");
        assert_eq!(place.district, "大安區");
        assert_eq!(place.source, PlaceSource::Hospital);
    }

    #[test]
    fn place_without_license_uses_name_as_id() {
        let raw = RawTasCenterRecord {
            name: "瑞光小站".to_string(),
            ..Default::default()
        };
        let place = normalize_tas_center(raw);
        assert_eq!(place.id, "瑞光小站");
        assert_eq!(place.source, PlaceSource::TasCenter);
    }
}
