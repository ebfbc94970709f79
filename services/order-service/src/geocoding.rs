// Port ke address resolution service. Koordinat bersifat non-kritis:
// kegagalan hanya di-log dan delivery tetap dibuat tanpa koordinat.
use async_trait::async_trait;
use serde::Deserialize;
use shared::utils::{
    http_client::{HttpClientError, ServiceClient},
    validation,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// Response GET /geocode?address=...
#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    latitude: f64,
    longitude: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// `Ok(None)` jika alamat tidak dikenal oleh service
    async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, HttpClientError>;
}

pub struct HttpAddressResolver {
    client: ServiceClient,
}

impl HttpAddressResolver {
    pub fn new(base_url: &str) -> Result<Self, HttpClientError> {
        let client = ServiceClient::new(base_url, Duration::from_secs(5))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, HttpClientError> {
        match self
            .client
            .get::<GeocodeResponse>("/geocode", &[("address", address)])
            .await
        {
            Ok(res) if validation::is_valid_coordinate(res.latitude, res.longitude) => {
                Ok(Some(GeoPoint {
                    latitude: res.latitude,
                    longitude: res.longitude,
                }))
            }
            Ok(res) => Err(HttpClientError::ParseError(format!(
                "Koordinat di luar jangkauan: {}, {}",
                res.latitude, res.longitude
            ))),
            Err(HttpClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Dipakai ketika GEOCODING_SERVICE_URL tidak dikonfigurasi
pub struct NoopAddressResolver;

#[async_trait]
impl AddressResolver for NoopAddressResolver {
    async fn resolve(&self, _address: &str) -> Result<Option<GeoPoint>, HttpClientError> {
        Ok(None)
    }
}

/// Pakai koordinat yang sudah ada, kalau tidak ada coba resolve alamat.
/// Tidak pernah gagal.
pub async fn locate(
    resolver: &dyn AddressResolver,
    known: Option<(f64, f64)>,
    address: &str,
) -> Option<(f64, f64)> {
    if known.is_some() {
        return known;
    }

    match resolver.resolve(address).await {
        Ok(Some(point)) => Some((point.latitude, point.longitude)),
        Ok(None) => {
            tracing::warn!("📍 Alamat tidak ditemukan oleh geocoding: {}", address);
            None
        }
        Err(e) => {
            tracing::warn!("⚠️  Geocoding gagal untuk '{}': {}", address, e);
            None
        }
    }
}
