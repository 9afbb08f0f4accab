//! Debug messenger severity levels and the callback that forwards
//! driver messages into [`tracing`].

use std::ffi::CStr;

use ash::vk;
use serde::Deserialize;

/// Minimum severity level for Vulkan validation layer messages.
///
/// Messages at or above the chosen level are forwarded to the
/// [`tracing`] subscriber; lower-severity messages are suppressed.
/// Variants are ordered least-to-most severe:
/// `Verbose < Info < Warning < Error`.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VulkanLogLevel {
    #[default]
    Verbose,
    Info,
    Warning,
    Error,
}

impl VulkanLogLevel {
    /// Severity mask containing this level and every level above it.
    pub fn severity_flags(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;
        match self {
            VulkanLogLevel::Verbose => {
                Sev::VERBOSE | Sev::INFO | Sev::WARNING | Sev::ERROR
            }
            VulkanLogLevel::Info => Sev::INFO | Sev::WARNING | Sev::ERROR,
            VulkanLogLevel::Warning => Sev::WARNING | Sev::ERROR,
            VulkanLogLevel::Error => Sev::ERROR,
        }
    }
}

/// Which message categories the debug messenger reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MessageTypes {
    pub general: bool,
    pub validation: bool,
    pub performance: bool,
}

impl Default for MessageTypes {
    fn default() -> Self {
        Self {
            general: true,
            validation: true,
            performance: true,
        }
    }
}

impl MessageTypes {
    pub fn type_flags(self) -> vk::DebugUtilsMessageTypeFlagsEXT {
        let mut flags = vk::DebugUtilsMessageTypeFlagsEXT::empty();
        if self.general {
            flags |= vk::DebugUtilsMessageTypeFlagsEXT::GENERAL;
        }
        if self.validation {
            flags |= vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION;
        }
        if self.performance {
            flags |= vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
        }
        flags
    }
}

pub(crate) fn message_type_str(
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "GENERAL",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "VALIDATION",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "PERFORMANCE",
        _ => "UNKNOWN",
    }
}

pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    //SAFETY: Vulkan guarantees p_callback_data is valid for the duration of
    //the callback, and we checked it for null above
    let p_message = unsafe { (*p_callback_data).p_message };
    let message = if p_message.is_null() {
        "<no message>".into()
    } else {
        //SAFETY: p_message is a null terminated string owned by the driver
        unsafe { CStr::from_ptr(p_message) }.to_string_lossy()
    };

    let type_str = message_type_str(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(
                target: "rvk-debug-messenger",
                "[{}] {}",
                type_str,
                message
            );
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(
                target: "rvk-debug-messenger",
                "[{}] {}",
                type_str,
                message
            );
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(
                target: "rvk-debug-messenger",
                "[{}] {}",
                type_str,
                message
            );
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(
                target: "rvk-debug-messenger",
                "[{}] {}",
                type_str,
                message
            );
        }
        _ => {
            tracing::debug!(
                target: "rvk-debug-messenger",
                "[{}] {}",
                type_str,
                message
            );
        }
    }

    vk::FALSE
}
