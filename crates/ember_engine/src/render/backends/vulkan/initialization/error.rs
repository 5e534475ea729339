//! Vulkan backend errors
//!
//! Every [`VulkanError`] records the source location where it was raised.
//! [`VulkanError::new`], the `From<ErrorKind>` conversion and [`api`] are all
//! `#[track_caller]`.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use ash::vk;
use thiserror::Error;

/// Shader stage named in pipeline errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// What went wrong
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A Vulkan call returned an error code
    #[error("{call} failed: {result:?}")]
    Api {
        /// Name of the failing Vulkan entry point
        call: &'static str,
        /// Returned result code
        result: vk::Result,
    },

    /// Loader, instance, surface or device setup failed
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device met the selection rules
    #[error("no supported GPU found")]
    NoSuitableDevice,

    /// The platform did not hand out an image in time
    #[error("timed out after {timeout:?} waiting to acquire a swapchain image")]
    AcquireTimeout {
        /// Deadline that expired
        timeout: Duration,
    },

    /// A slot's previous submission did not retire in time
    #[error("timed out after {timeout:?} waiting for GPU progress {value}")]
    ProgressTimeout {
        /// Completion-counter value that was awaited
        value: u64,
        /// Deadline that expired
        timeout: Duration,
    },

    /// The chain no longer matches the surface and must be rebuilt
    #[error("swapchain is out of date")]
    SwapchainOutOfDate,

    /// Queue submission was rejected
    #[error("unable to submit command buffers: {0:?}")]
    SubmitFailed(vk::Result),

    /// Presentation was rejected
    #[error("unable to present image: {0:?}")]
    PresentFailed(vk::Result),

    /// Pipeline creation was given an empty SPIR-V blob
    #[error("unable to build render pipeline with empty {stage} shader bytecode")]
    EmptyShaderBytecode {
        /// Stage whose bytecode was empty
        stage: ShaderStage,
    },

    /// `begin_frame` was called while another frame is still active
    #[error("a frame is already in progress")]
    FrameInProgress,

    /// The frame handle does not belong to the active frame
    #[error("frame handle is stale or belongs to another context")]
    InvalidFrame,

    /// An operation was attempted in the wrong state
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// Why the operation is not allowed
        reason: String,
    },
}

/// Backend error with the location that raised it
#[derive(Error, Debug, Clone)]
#[error("{kind}")]
pub struct VulkanError {
    kind: ErrorKind,
    location: &'static Location<'static>,
}

impl VulkanError {
    /// Create an error located at the caller
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    /// What went wrong
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Where the error was raised
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Whether the image chain has to be rebuilt before rendering can continue
    pub fn is_out_of_date(&self) -> bool {
        matches!(self.kind, ErrorKind::SwapchainOutOfDate)
    }

    /// Whether the error is a recoverable timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::AcquireTimeout { .. } | ErrorKind::ProgressTimeout { .. }
        )
    }
}

impl From<ErrorKind> for VulkanError {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Build a `map_err` adapter for a failing Vulkan call
///
/// ```ignore
/// unsafe { device.create_semaphore(&info, None) }.map_err(api("vkCreateSemaphore"))?;
/// ```
#[track_caller]
pub fn api(call: &'static str) -> impl FnOnce(vk::Result) -> VulkanError {
    let location = Location::caller();
    move |result| VulkanError {
        kind: ErrorKind::Api { call, result },
        location,
    }
}
