pub mod paws;

// 重新导出常用类型和函数，方便外部使用
pub use paws::{
    animal::{Animal, AnimalType, FilterSpec, Page, PlaceRecord, SearchResult},
    client::{ClientConfig, PawsClient},
    profile::{CachedIdentity, LocalProfile},
    swipe::{EmptySwipeListener, SessionPhase, SwipeListener, SwipeSession},
};
