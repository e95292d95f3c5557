//! 动物与场所的标准化（canonical）数据模型
//!
//! 所有上游来源（后端动物表、全国收容所、北市开放资料）归一化后都落到这里的形状

use serde::{Deserialize, Serialize};

/// 动物性别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// 从上游原始值解析，闭集之外一律收敛到 Unknown
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim() {
            "Male" | "male" | "M" | "公" | "男" => Gender::Male,
            "Female" | "female" | "F" | "母" | "女" => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

/// 动物领养状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimalStatus {
    Available,
    Pending,
    Adopted,
}

impl AnimalStatus {
    /// 从上游原始值解析，闭集之外一律收敛到 Available
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "待定" | "洽谈中" | "洽談中" => AnimalStatus::Pending,
            "adopted" | "已领养" | "已領養" | "done" => AnimalStatus::Adopted,
            _ => AnimalStatus::Available,
        }
    }
}

/// 动物种类（本产品只区分狗 / 猫）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimalType {
    Dog,
    Cat,
}

impl AnimalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimalType::Dog => "dog",
            AnimalType::Cat => "cat",
        }
    }
}

/// 健康记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// 最近一次体检日期，无记录时为空串
    #[serde(default)]
    pub last_checkup: String,
    /// 有意义的健康状况列表（已剔除 "none" / "無" 哨兵值）
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// 喂食计划
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedingSchedule {
    #[serde(default)]
    pub food_type: String,
    #[serde(default)]
    pub times_per_day: i32,
    #[serde(default)]
    pub portion_size: String,
    #[serde(default)]
    pub notes: String,
}

/// 疫苗接种记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationRecord {
    pub vaccine_name: String,
    pub date_administered: String,
    #[serde(default)]
    pub next_due_date: Option<String>,
}

/// 标准化动物记录
///
/// 不变式：`photos` 与 `personality_traits` 归一化后永不为空（缺失时填占位值）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animal {
    pub id: String,
    pub name: String,
    pub breed: String,
    /// 年龄（岁），可能为估计值
    pub age: i32,
    pub gender: Gender,
    pub photos: Vec<String>,
    pub description: String,
    pub health_record: HealthRecord,
    pub feeding_schedule: FeedingSchedule,
    pub vaccination_records: Vec<VaccinationRecord>,
    pub status: AnimalStatus,
    pub location: String,
    pub personality_traits: Vec<String>,
    pub animal_type: AnimalType,
}

/// 场所来源（对应各政府开放资料集）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceSource {
    /// 特约兽医院
    Hospital,
    /// 宠物登记站
    RegistrationStation,
    /// 特定宠物业
    Business,
    /// TAS 领养小站
    TasCenter,
}

/// 标准化场所记录（搜索页共用的最小形状）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRecord {
    pub id: String,
    pub name: String,
    pub district: String,
    pub address: String,
    pub phone: String,
    pub source: PlaceSource,
}
