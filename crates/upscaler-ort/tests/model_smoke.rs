use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};

use upscaler_core::{ModelConfig, TileConfig, UpscaleBackend, Upscaler, WeightsConfig};
use upscaler_ort::OrtBackend;

fn weights_from_env() -> PathBuf {
    PathBuf::from(env::var("UPSCALER_TEST_WEIGHTS").expect("set UPSCALER_TEST_WEIGHTS"))
}

fn checkerboard(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgb([230, 40, 40])
        } else {
            Rgb([20, 20, 200])
        }
    })
}

#[tokio::test]
#[ignore = "requires Real-ESRGAN x4 ONNX weights"]
async fn repeated_upscale_yields_4x_images() {
    let backend = Arc::new(OrtBackend::new(ModelConfig {
        weights: WeightsConfig {
            path: weights_from_env(),
            url: None,
            sha256: None,
        },
        ..ModelConfig::default()
    }));
    backend.initialize().await.expect("model should load");
    assert_eq!(backend.metadata().unwrap().scale, 4);
    assert!(backend.provider().is_some());

    let upscaler = Upscaler::new(backend.clone(), TileConfig::default());
    let input = DynamicImage::ImageRgb8(checkerboard(100, 60));

    let first = upscaler.upscale_image(&input).await.unwrap();
    let second = upscaler.upscale_image(&input).await.unwrap();
    assert_eq!(first.dimensions(), (400, 240));
    assert_eq!(second.dimensions(), first.dimensions());

    backend.shutdown().await.unwrap();
    assert_eq!(backend.inference_metrics.snapshot().passes, 2);
}

#[tokio::test]
#[ignore = "requires Real-ESRGAN x4 ONNX weights"]
async fn second_initialize_is_rejected() {
    let backend = OrtBackend::new(ModelConfig {
        weights: WeightsConfig {
            path: weights_from_env(),
            url: None,
            sha256: None,
        },
        ..ModelConfig::default()
    });
    backend.initialize().await.unwrap();
    let err = backend.initialize().await.unwrap_err();
    assert_eq!(err.error_code(), 23);
}

#[tokio::test]
#[ignore = "requires Real-ESRGAN x4 ONNX weights"]
async fn shut_down_backend_stays_shut_down() {
    let backend = OrtBackend::new(ModelConfig {
        weights: WeightsConfig {
            path: weights_from_env(),
            url: None,
            sha256: None,
        },
        ..ModelConfig::default()
    });
    backend.initialize().await.unwrap();
    backend.shutdown().await.unwrap();

    let err = backend.initialize().await.unwrap_err();
    assert_eq!(err.error_code(), 23);
    let err = backend
        .process(checkerboard(8, 8))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), 22);
}

#[tokio::test(flavor = "current_thread")]
#[ignore = "requires Real-ESRGAN x4 ONNX weights"]
async fn inference_leaves_the_runtime_responsive() {
    let backend = Arc::new(OrtBackend::new(ModelConfig {
        weights: WeightsConfig {
            path: weights_from_env(),
            url: None,
            sha256: None,
        },
        ..ModelConfig::default()
    }));
    backend.initialize().await.unwrap();

    // On a single-threaded runtime the ticker only advances if the pass
    // runs somewhere other than the runtime thread.
    let ticks = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                ticks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
    };
    tokio::task::yield_now().await;
    let before = ticks.load(std::sync::atomic::Ordering::Relaxed);

    let out = backend.process(checkerboard(192, 192)).await.unwrap();
    assert_eq!(out.dimensions(), (768, 768));
    let after = ticks.load(std::sync::atomic::Ordering::Relaxed);
    ticker.abort();

    assert!(after > before + 1, "runtime thread was blocked during inference");
}
