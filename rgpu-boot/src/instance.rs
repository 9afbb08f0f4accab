//! Vulkan instance creation.
//!
//! [`create_instance`] filters the requested extensions and layers down to
//! what the driver offers, then creates the instance. Drivers that only
//! expose a portability subset (MoltenVK and friends) reject the first
//! attempt with `VK_ERROR_INCOMPATIBLE_DRIVER`; [`PortabilityRetry`] adds
//! portability enumeration and tries exactly once more.
//!
//! [`VkVersion`] is a thin newtype over the packed Vulkan version word.

use std::{ffi::CString, fmt, str::FromStr};

use ash::{prelude::VkResult, vk};
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::log_catalog;
use crate::debug::DebugMessengerConfig;
use crate::driver::{Driver, InstanceRequest, to_cstrings};
use crate::negotiate::{CapabilityKind, DroppedCapability, negotiate};
use crate::surface::{WindowError, WindowSystem};

pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
pub const PORTABILITY_ENUMERATION_EXTENSION: &str =
    "VK_KHR_portability_enumeration";
pub const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// A packed Vulkan API version number.
///
/// Wraps the 32-bit encoding used by `VkApplicationInfo`. Construct from
/// components with [`new`](Self::new), wrap an already-encoded word with
/// [`from_raw`](Self::from_raw), or parse `"major.minor.patch"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct VkVersion(u32);

impl VkVersion {
    pub const V1_3: Self = Self(vk::API_VERSION_1_3);

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(variant: u32, major: u32, minor: u32, patch: u32) -> Self {
        Self(vk::make_api_version(variant, major, minor, patch))
    }

    pub fn variant(&self) -> u32 {
        vk::api_version_variant(self.0)
    }

    pub fn major(&self) -> u32 {
        vk::api_version_major(self.0)
    }
    pub fn minor(&self) -> u32 {
        vk::api_version_minor(self.0)
    }
    pub fn patch(&self) -> u32 {
        vk::api_version_patch(self.0)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid Vulkan version '{0}', expected major.minor[.patch]")]
pub struct VersionParseError(String);

impl FromStr for VkVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError(s.to_owned());
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;

        match parts[..] {
            [major, minor] => Ok(Self::new(0, major, minor, 0)),
            [major, minor, patch] => Ok(Self::new(0, major, minor, patch)),
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for VkVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub application_name: String,
    pub application_version: VkVersion,
    pub engine_name: String,
    pub engine_version: VkVersion,
    pub api_version: VkVersion,
    /// Requested instance extensions. Rewritten in place to the subset that
    /// was actually enabled.
    pub extensions: Vec<String>,
    /// Append the window system's surface extensions to `extensions`.
    pub query_window_extensions: bool,
    /// Requested instance layers. Rewritten in place like `extensions`.
    pub layers: Vec<String>,
    pub enable_validation: bool,
    pub validation_layers: Vec<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            application_name: "rgpu-boot".to_owned(),
            application_version: VkVersion::new(0, 0, 1, 0),
            engine_name: "rvk".to_owned(),
            engine_version: VkVersion::new(0, 0, 1, 0),
            api_version: VkVersion::V1_3,
            extensions: Vec::new(),
            query_window_extensions: true,
            layers: Vec::new(),
            enable_validation: cfg!(debug_assertions),
            validation_layers: vec![KHRONOS_VALIDATION_LAYER.to_owned()],
        }
    }
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Could not enumerate instance capabilities: {0}")]
    Enumerate(vk::Result),
    #[error("Window extensions were requested but no window was supplied")]
    NoWindowSystem,
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("Name contains an interior NUL: {0:?}")]
    InvalidName(String),
    #[error("Driver is incompatible even with portability enumeration")]
    IncompatibleDriver,
    #[error("Instance creation failed: {0}")]
    Creation(vk::Result),
}

/// Tracks the one-shot portability enumeration retry.
///
/// `Initial` and `Adapted` are the two attempts; `Done` and `Failed` are
/// terminal. Only an incompatible-driver result in `Initial` moves to
/// `Adapted`, so at most two attempts are ever made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortabilityRetry {
    Initial,
    Adapted,
    Done(vk::Instance),
    Failed(vk::Result),
}

impl PortabilityRetry {
    pub fn advance(self, result: VkResult<vk::Instance>) -> Self {
        match (self, result) {
            (Self::Initial | Self::Adapted, Ok(handle)) => Self::Done(handle),
            (Self::Initial, Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER)) => {
                Self::Adapted
            }
            (Self::Initial | Self::Adapted, Err(e)) => Self::Failed(e),
            (terminal, _) => terminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInstance {
    pub handle: vk::Instance,
    /// `VK_EXT_debug_utils` survived negotiation and is enabled.
    pub debug_utils_enabled: bool,
    pub portability_applied: bool,
    /// Requested extensions that negotiation removed.
    pub dropped_extensions: Vec<DroppedCapability>,
    /// Requested layers that negotiation removed.
    pub dropped_layers: Vec<DroppedCapability>,
}

/// Creates the Vulkan instance described by `config`.
///
/// `config.extensions` and `config.layers` are negotiated in place, so after
/// this returns they hold exactly what the instance was created with. The
/// debug messenger descriptor is chained into the create info when
/// validation is on, `debug_messenger` is set, and the debug utils extension
/// is available.
pub fn create_instance<D: Driver + ?Sized>(
    driver: &mut D,
    window: Option<&dyn WindowSystem>,
    config: &mut InstanceConfig,
    debug_messenger: Option<&DebugMessengerConfig>,
) -> Result<CreatedInstance, InstanceError> {
    let _span = tracing::debug_span!("create_instance").entered();

    let available_exts =
        driver.instance_extensions().map_err(InstanceError::Enumerate)?;
    let available_layers =
        driver.instance_layers().map_err(InstanceError::Enumerate)?;
    log_catalog("instance extensions", &available_exts);
    log_catalog("instance layers", &available_layers);

    if config.query_window_extensions {
        let window = window.ok_or(InstanceError::NoWindowSystem)?;
        config.extensions.extend(window.required_instance_extensions()?);
    }

    let wants_messenger = config.enable_validation && debug_messenger.is_some();
    if wants_messenger {
        config.extensions.push(DEBUG_UTILS_EXTENSION.to_owned());
    }
    if config.enable_validation {
        config
            .layers
            .extend(config.validation_layers.iter().cloned());
    }

    let dropped_extensions = negotiate(
        &mut config.extensions,
        &available_exts,
        CapabilityKind::InstanceExtension,
    );
    let dropped_layers = negotiate(
        &mut config.layers,
        &available_layers,
        CapabilityKind::InstanceLayer,
    );

    let debug_utils_enabled =
        config.extensions.iter().any(|ext| ext == DEBUG_UTILS_EXTENSION);
    let debug_info = debug_messenger
        .filter(|_| wants_messenger && debug_utils_enabled)
        .map(DebugMessengerConfig::create_info);
    if wants_messenger && !debug_utils_enabled {
        tracing::warn!(
            "Debug messenger requested but {DEBUG_UTILS_EXTENSION} is unavailable"
        );
    }

    let application_name = CString::new(config.application_name.as_str())
        .map_err(|_| InstanceError::InvalidName(config.application_name.clone()))?;
    let engine_name = CString::new(config.engine_name.as_str())
        .map_err(|_| InstanceError::InvalidName(config.engine_name.clone()))?;
    let layers = to_cstrings(&config.layers).map_err(InstanceError::InvalidName)?;

    let mut flags = vk::InstanceCreateFlags::empty();
    let mut portability_applied = false;
    let mut retry = PortabilityRetry::Initial;

    let handle = loop {
        match retry {
            PortabilityRetry::Done(handle) => break handle,
            PortabilityRetry::Failed(vk::Result::ERROR_INCOMPATIBLE_DRIVER) => {
                tracing::error!(
                    "Driver rejected the instance even with portability enumeration"
                );
                return Err(InstanceError::IncompatibleDriver);
            }
            PortabilityRetry::Failed(e) => {
                tracing::error!("Instance creation failed: {e}");
                return Err(InstanceError::Creation(e));
            }
            PortabilityRetry::Adapted => {
                tracing::warn!(
                    "Incompatible driver, retrying with {PORTABILITY_ENUMERATION_EXTENSION}"
                );
                if !config
                    .extensions
                    .iter()
                    .any(|ext| ext == PORTABILITY_ENUMERATION_EXTENSION)
                {
                    config
                        .extensions
                        .push(PORTABILITY_ENUMERATION_EXTENSION.to_owned());
                }
                flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
                portability_applied = true;
            }
            PortabilityRetry::Initial => {}
        }

        let extensions =
            to_cstrings(&config.extensions).map_err(InstanceError::InvalidName)?;
        let request = InstanceRequest {
            application_name: &application_name,
            application_version: config.application_version.to_raw(),
            engine_name: &engine_name,
            engine_version: config.engine_version.to_raw(),
            api_version: config.api_version.to_raw(),
            extensions: &extensions,
            layers: &layers,
            flags,
            debug_messenger: debug_info,
        };
        retry = retry.advance(driver.create_instance(&request));
    };

    tracing::debug!(
        "Created Vulkan {} instance {:?}",
        config.api_version,
        handle
    );
    Ok(CreatedInstance {
        handle,
        debug_utils_enabled,
        portability_applied,
        dropped_extensions,
        dropped_layers,
    })
}
