//! Test utilities for integration tests.
//!
//! Provides in-process test images, a fault-injecting codec and a builder
//! wiring the whole service around a [`MemoryStore`].

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use bytes::Bytes;
use image::metadata::Orientation;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tower::ServiceExt;

use image_variants::codec::{Codec, DecodedImage, RasterCodec};
use image_variants::error::CodecError;
use image_variants::server::{create_router, AppState, EventSigner, RouterConfig};
use image_variants::variant::{MediaFormat, QualityParams, Transformer};
use image_variants::{MemoryStore, VariantCache, VariantPolicy, VariantService, WarmCache};

/// Origin location used by every test app.
pub const BUCKET: &str = "images";

// =============================================================================
// Test Images
// =============================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    })
}

fn encode(image: DynamicImage, format: ImageFormat) -> Bytes {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    Bytes::from(buf.into_inner())
}

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

pub fn gif_bytes(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Gif)
}

pub fn svg_bytes(width: u32, height: u32) -> Bytes {
    Bytes::from(format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><rect width="{w}" height="{h}" fill="#3366cc"/></svg>"##,
        w = width,
        h = height
    ))
}

/// Decode response bytes and return their dimensions.
pub fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(bytes).unwrap();
    (image.width(), image.height())
}

pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8])
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, b'P', b'N', b'G'])
}

pub fn is_webp(bytes: &[u8]) -> bool {
    bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}

pub fn is_avif(bytes: &[u8]) -> bool {
    bytes.len() > 12 && &bytes[4..8] == b"ftyp" && &bytes[8..12] == b"avif"
}

// =============================================================================
// Fault-Injecting Codec
// =============================================================================

/// Delegates to [`RasterCodec`] but fails every encode to one format.
pub struct FaultyCodec {
    inner: RasterCodec,
    target: MediaFormat,
    error: CodecError,
}

impl FaultyCodec {
    pub fn failing(target: MediaFormat, error: CodecError) -> Self {
        Self {
            inner: RasterCodec::new(),
            target,
            error,
        }
    }
}

impl Codec for FaultyCodec {
    fn decode(&self, bytes: &[u8], format: MediaFormat) -> Result<DecodedImage, CodecError> {
        self.inner.decode(bytes, format)
    }

    fn rotate(&self, image: DynamicImage, orientation: Orientation) -> DynamicImage {
        self.inner.rotate(image, orientation)
    }

    fn resize(&self, image: DynamicImage, width: u32) -> DynamicImage {
        self.inner.resize(image, width)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: MediaFormat,
        params: &QualityParams,
    ) -> Result<Bytes, CodecError> {
        if format == self.target {
            return Err(self.error.clone());
        }
        self.inner.encode(image, format, params)
    }
}

// =============================================================================
// Test App
// =============================================================================

/// A wired service plus handles on its parts.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub service: Arc<VariantService>,
    pub warm: Arc<WarmCache>,
    pub router: Router,
}

/// Builder for [`TestApp`]. Defaults: persistence on, no hot cache, edge
/// normalizer on, unsigned webhook.
pub struct TestAppBuilder {
    policy: VariantPolicy,
    codec: Arc<dyn Codec>,
    persist: bool,
    hot_cache: bool,
    warm: bool,
    edge_normalize: bool,
    public_url: Option<String>,
    secret: Option<String>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            policy: VariantPolicy::default(),
            codec: Arc::new(RasterCodec::new()),
            persist: true,
            hot_cache: false,
            warm: true,
            edge_normalize: true,
            public_url: None,
            secret: None,
        }
    }
}

impl TestAppBuilder {
    pub fn policy(mut self, policy: VariantPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn with_hot_cache(mut self) -> Self {
        self.hot_cache = true;
        self
    }

    pub fn without_warm_cache(mut self) -> Self {
        self.warm = false;
        self
    }

    pub fn without_edge_normalize(mut self) -> Self {
        self.edge_normalize = false;
        self
    }

    pub fn public_url(mut self, base: &str) -> Self {
        self.public_url = Some(base.to_string());
        self
    }

    pub fn secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn build(self) -> TestApp {
        let mut store = MemoryStore::new(BUCKET);
        if let Some(base) = self.public_url {
            store = store.with_public_base_url(base);
        }
        let store = Arc::new(store);
        let policy = Arc::new(self.policy);

        let mut service = VariantService::new(store.clone(), self.codec.clone(), policy.clone());
        if self.persist {
            service = service.with_variant_store(store.clone());
        }
        if self.hot_cache {
            service = service.with_cache(Arc::new(VariantCache::new()));
        }
        let service = Arc::new(service);

        let warm = Arc::new(WarmCache::new(
            store.clone(),
            store.clone(),
            Transformer::new(self.codec, &policy),
            policy,
        ));

        let mut state = AppState::new(service.clone());
        if self.warm {
            state = state.with_warm_cache(warm.clone());
        }
        if let Some(secret) = self.secret {
            state = state.with_signer(EventSigner::new(secret));
        }

        let config = RouterConfig::new()
            .with_tracing(false)
            .with_edge_normalize(self.edge_normalize);
        let router = create_router(state, config);

        TestApp {
            store,
            service,
            warm,
            router,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    /// Send a request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, accept: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    use http_body_util::BodyExt;
    response.into_body().collect().await.unwrap().to_bytes()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
