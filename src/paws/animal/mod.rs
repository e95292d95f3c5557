//! 动物模块：标准化模型、记录归一化、搜索过滤与代理接口客户端

pub mod api;
pub mod models;
pub mod normalize;
pub mod query;

// 重新导出主要类型和函数
pub use api::AnimalApi;
pub use models::{
    Animal, AnimalStatus, AnimalType, FeedingSchedule, Gender, HealthRecord, PlaceRecord,
    PlaceSource, VaccinationRecord,
};
pub use normalize::{normalize_animal, normalize_shelter_animal, RawAnimalRecord};
pub use query::{filter_animals, filter_places, FilterSpec, Page, PlaceFilterSpec, SearchResult};
