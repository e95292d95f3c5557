//! 政府开放资料代理接口的 HTTP 客户端
//!
//! 每个来源都是一个 GET 端点，接受 `q` / `limit` / `offset` 与来源特有的过滤参数，
//! 返回 `{ success, result, error? }` 信封；信封解包统一走 [`unwrap_envelope`]

use crate::paws::animal::models::{Animal, PlaceRecord, PlaceSource};
use crate::paws::animal::normalize::{
    normalize_business, normalize_hospital, normalize_registration_station,
    normalize_shelter_animal, normalize_tas_center, RawBusinessRecord, RawHospitalRecord,
    RawRegistrationStationRecord, RawShelterRecord, RawTasCenterRecord,
};
use crate::paws::animal::query::{
    filter_animals, filter_places, FilterSpec, PlaceFilterSpec, SearchResult,
};
use crate::paws::types::{unwrap_envelope, Unwrapped};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 代理接口客户端
pub struct AnimalApi {
    client: reqwest::Client,
    proxy_base_url: String,
}

impl AnimalApi {
    pub fn new(client: reqwest::Client, proxy_base_url: String) -> Self {
        Self {
            client,
            proxy_base_url,
        }
    }

    /// 通用拉取：请求一个来源端点并解包信封
    async fn fetch_source<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Unwrapped<T>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.proxy_base_url, path);

        info!("[AnimalAPI] 📡 请求代理来源: {}", path);
        debug!("[AnimalAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .context(format!("请求 {} 失败", path))?;

        let status = response.status();
        let body_bytes = response
            .bytes()
            .await
            .context("读取响应 body 失败")?;
        let body_str = String::from_utf8_lossy(&body_bytes);
        debug!("[AnimalAPI] {} 响应 Body: {}", path, body_str);

        if !status.is_success() {
            return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
        }

        let body: Value =
            serde_json::from_slice(&body_bytes).context(format!("解析 {} 响应失败", path))?;
        let unwrapped = unwrap_envelope(body, path)?;
        info!(
            "[AnimalAPI] ✅ {} 返回 {} 条记录",
            path,
            unwrapped.items.len()
        );
        Ok(unwrapped)
    }

    fn base_query(keyword: &str, limit: usize, offset: usize) -> Vec<(&'static str, String)> {
        vec![
            ("q", keyword.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]
    }

    /// 特约兽医院
    pub async fn fetch_hospitals(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlaceRecord>> {
        let unwrapped: Unwrapped<RawHospitalRecord> = self
            .fetch_source("/api/hospitals", &Self::base_query(keyword, limit, offset))
            .await?;
        Ok(unwrapped.items.into_iter().map(normalize_hospital).collect())
    }

    /// 宠物登记站
    pub async fn fetch_registration_stations(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlaceRecord>> {
        let unwrapped: Unwrapped<RawRegistrationStationRecord> = self
            .fetch_source(
                "/api/registration-stations",
                &Self::base_query(keyword, limit, offset),
            )
            .await?;
        Ok(unwrapped
            .items
            .into_iter()
            .map(normalize_registration_station)
            .collect())
    }

    /// 特定宠物业
    pub async fn fetch_businesses(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
        district: Option<&str>,
    ) -> Result<Vec<PlaceRecord>> {
        let mut query = Self::base_query(keyword, limit, offset);
        if let Some(district) = district {
            query.push(("district", district.to_string()));
        }
        let unwrapped: Unwrapped<RawBusinessRecord> =
            self.fetch_source("/api/pet-businesses", &query).await?;
        Ok(unwrapped.items.into_iter().map(normalize_business).collect())
    }

    /// 收容所动物（全国开放资料）
    pub async fn fetch_shelter_animals(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Animal>> {
        let unwrapped: Unwrapped<RawShelterRecord> = self
            .fetch_source(
                "/api/shelter-animals",
                &Self::base_query(keyword, limit, offset),
            )
            .await?;
        Ok(unwrapped
            .items
            .into_iter()
            .map(normalize_shelter_animal)
            .collect())
    }

    /// TAS 领养小站
    pub async fn fetch_tas_centers(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlaceRecord>> {
        let unwrapped: Unwrapped<RawTasCenterRecord> = self
            .fetch_source(
                "/api/tas-centers",
                &Self::base_query(keyword, limit, offset),
            )
            .await?;
        Ok(unwrapped
            .items
            .into_iter()
            .map(normalize_tas_center)
            .collect())
    }

    /// 收容所动物搜索：先向代理要一大页，再在本地做两阶段过滤与分页
    ///
    /// 上游失败不会抛出，返回带错误指示的空结果
    pub async fn search_shelter_animals(&self, spec: &FilterSpec) -> SearchResult<Animal> {
        let keyword = spec.keyword.as_deref().unwrap_or("");
        match self
            .fetch_shelter_animals(keyword, UPSTREAM_PAGE_SIZE, 0)
            .await
        {
            Ok(animals) => SearchResult::from_page(filter_animals(&animals, spec)),
            Err(e) => {
                warn!("[AnimalAPI] 收容所动物搜索失败: {:?}", e);
                SearchResult::failed(format!("{e:#}"))
            }
        }
    }

    /// 场所搜索：按来源取数后在本地过滤分页；未指定来源时聚合全部四个来源
    pub async fn search_places(&self, spec: &PlaceFilterSpec) -> SearchResult<PlaceRecord> {
        let keyword = spec.keyword.as_deref().unwrap_or("");
        let fetched = match spec.source {
            Some(PlaceSource::Hospital) => {
                self.fetch_hospitals(keyword, UPSTREAM_PAGE_SIZE, 0).await
            }
            Some(PlaceSource::RegistrationStation) => {
                self.fetch_registration_stations(keyword, UPSTREAM_PAGE_SIZE, 0)
                    .await
            }
            Some(PlaceSource::Business) => {
                self.fetch_businesses(keyword, UPSTREAM_PAGE_SIZE, 0, spec.district.as_deref())
                    .await
            }
            Some(PlaceSource::TasCenter) => {
                self.fetch_tas_centers(keyword, UPSTREAM_PAGE_SIZE, 0).await
            }
            None => {
                let (hospitals, stations, businesses, centers) = tokio::join!(
                    self.fetch_hospitals(keyword, UPSTREAM_PAGE_SIZE, 0),
                    self.fetch_registration_stations(keyword, UPSTREAM_PAGE_SIZE, 0),
                    self.fetch_businesses(keyword, UPSTREAM_PAGE_SIZE, 0, spec.district.as_deref()),
                    self.fetch_tas_centers(keyword, UPSTREAM_PAGE_SIZE, 0),
                );
                hospitals.and_then(|mut all| {
                    all.extend(stations?);
                    all.extend(businesses?);
                    all.extend(centers?);
                    Ok(all)
                })
            }
        };
        match fetched {
            Ok(places) => SearchResult::from_page(filter_places(&places, spec)),
            Err(e) => {
                warn!("[AnimalAPI] 场所搜索失败: {:?}", e);
                SearchResult::failed(format!("{e:#}"))
            }
        }
    }
}

/// 向上游要的页大小：故意大于展示页，本地细筛后再分页
const UPSTREAM_PAGE_SIZE: usize = 200;
