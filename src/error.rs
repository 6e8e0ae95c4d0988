use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccelError {
    #[error("device catalog is empty (native CPU entry missing)")]
    EmptyCatalog,
    #[error("wgpu error: {0}")]
    Wgpu(String),
    #[error("kernel build failed for {stem} on {device}: {message}")]
    KernelBuild {
        stem: String,
        device: String,
        message: String,
    },
    #[error("device buffer allocation failed: {0}")]
    Allocation(String),
    #[error("unsupported pixel depth {depth} for {op}")]
    UnsupportedDepth { op: &'static str, depth: u32 },
    #[error("unsupported channel count {channels} for {depth} bpp input")]
    UnsupportedChannels { channels: usize, depth: u32 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("image geometry mismatch: {0}")]
    GeometryMismatch(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type AccelResult<T> = Result<T, AccelError>;

impl AccelError {
    pub(crate) fn kernel_build(stem: &str, device: &str, message: impl Into<String>) -> Self {
        AccelError::KernelBuild {
            stem: stem.to_string(),
            device: device.to_string(),
            message: message.into(),
        }
    }
}

impl From<wgpu::RequestDeviceError> for AccelError {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        AccelError::Wgpu(err.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for AccelError {
    fn from(err: wgpu::BufferAsyncError) -> Self {
        AccelError::Wgpu(err.to_string())
    }
}

impl From<wgpu::PollError> for AccelError {
    fn from(err: wgpu::PollError) -> Self {
        AccelError::Wgpu(err.to_string())
    }
}
