use std::path::PathBuf;

use clap::Parser;

use crate::decode::DecodeLimits;
use crate::preprocess::{ChannelOrder, PreprocessConfig};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ONNX model path
    #[arg(long, env = "MODEL_PATH", default_value = "model.onnx")]
    pub model: PathBuf,

    /// Food info JSON; its keys are the class labels, in model output order
    #[arg(long, env = "FOOD_INFO_PATH", default_value = "food_info.json")]
    pub food_info: PathBuf,

    /// Static asset root (login, admin and kiosk pages)
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: PathBuf,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Model input width
    #[arg(long, env = "IMG_WIDTH", default_value_t = 128)]
    pub width: usize,

    /// Model input height
    #[arg(long, env = "IMG_HEIGHT", default_value_t = 128)]
    pub height: usize,

    /// Channel order the model was trained with
    #[arg(long, env = "CHANNEL_ORDER", value_enum, default_value_t = ChannelOrder::Bgr)]
    pub channel_order: ChannelOrder,

    /// Run inference on the CUDA execution provider
    #[arg(long, env = "USE_CUDA")]
    pub cuda: bool,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 32 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Largest accepted image width or height, in pixels, checked before decoding
    #[arg(long, env = "MAX_IMAGE_SIDE", default_value_t = 8192)]
    pub max_image_side: u32,

    /// Largest allocation a single image decode may make, in bytes
    #[arg(long, env = "MAX_DECODE_BYTES", default_value_t = 256 * 1024 * 1024)]
    pub max_decode_bytes: u64,

    /// Exit instead of serving in degraded mode when the model fails to load
    #[arg(long, env = "REQUIRE_MODEL")]
    pub require_model: bool,
}

impl Args {
    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            width: self.width,
            height: self.height,
            channel_order: self.channel_order,
            ..PreprocessConfig::default()
        }
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_width: self.max_image_side,
            max_height: self.max_image_side,
            max_alloc: self.max_decode_bytes,
        }
    }

    /// Host and port for `TcpListener::bind`, which resolves host names.
    pub fn bind_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}
