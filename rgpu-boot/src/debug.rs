//! Debug utils messenger setup and teardown.
//!
//! `vkCreateDebugUtilsMessengerEXT` and `vkDestroyDebugUtilsMessengerEXT` are
//! extension functions, so they are looked up by name at runtime.
//! [`DebugUtilsFns`] is the typed result of that lookup: either both
//! functions resolve and the table is usable, or setup fails with
//! [`DebugError::FunctionNotResolvable`].

use std::ffi::CStr;

use ash::vk;
use serde::Deserialize;
use thiserror::Error;

use crate::driver::Driver;
use crate::log::{MessageTypes, VulkanLogLevel, vulkan_debug_callback};
use crate::state::RuntimeState;

pub const CREATE_DEBUG_MESSENGER_FN: &CStr = c"vkCreateDebugUtilsMessengerEXT";
pub const DESTROY_DEBUG_MESSENGER_FN: &CStr = c"vkDestroyDebugUtilsMessengerEXT";

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Cannot create Vulkan message callback before creating VkInstance")]
    InstanceNotInitialized,
    #[error("Driver does not export {0:?}")]
    FunctionNotResolvable(&'static CStr),
    #[error("A debug messenger is already installed")]
    AlreadyInstalled,
    #[error("Failed to set up Vulkan debug messenger: {0}")]
    Creation(vk::Result),
}

/// How the debug messenger filters driver messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugMessengerConfig {
    pub max_log_level: VulkanLogLevel,
    pub message_types: MessageTypes,
}

impl DebugMessengerConfig {
    pub fn create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(self.max_log_level.severity_flags())
            .message_type(self.message_types.type_flags())
            .pfn_user_callback(Some(vulkan_debug_callback))
    }
}

/// Resolved debug utils entry points for one instance.
#[derive(Clone, Copy)]
pub struct DebugUtilsFns {
    create: vk::PFN_vkCreateDebugUtilsMessengerEXT,
    destroy: vk::PFN_vkDestroyDebugUtilsMessengerEXT,
}

impl std::fmt::Debug for DebugUtilsFns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugUtilsFns").finish_non_exhaustive()
    }
}

impl DebugUtilsFns {
    /// Looks up both messenger functions for `instance`.
    pub fn resolve<D: Driver + ?Sized>(
        driver: &D,
        instance: vk::Instance,
    ) -> Result<Self, DebugError> {
        let create = driver
            .instance_proc_addr(instance, CREATE_DEBUG_MESSENGER_FN)
            .ok_or_else(|| {
                tracing::error!(
                    "Could not get function '{}'",
                    CREATE_DEBUG_MESSENGER_FN.to_string_lossy()
                );
                DebugError::FunctionNotResolvable(CREATE_DEBUG_MESSENGER_FN)
            })?;
        let destroy = driver
            .instance_proc_addr(instance, DESTROY_DEBUG_MESSENGER_FN)
            .ok_or_else(|| {
                tracing::error!(
                    "Could not get function '{}'",
                    DESTROY_DEBUG_MESSENGER_FN.to_string_lossy()
                );
                DebugError::FunctionNotResolvable(DESTROY_DEBUG_MESSENGER_FN)
            })?;

        Ok(Self {
            //SAFETY: vkGetInstanceProcAddr returned this pointer for
            //vkCreateDebugUtilsMessengerEXT, so it has that signature
            create: unsafe {
                std::mem::transmute::<
                    unsafe extern "system" fn(),
                    vk::PFN_vkCreateDebugUtilsMessengerEXT,
                >(create)
            },
            //SAFETY: vkGetInstanceProcAddr returned this pointer for
            //vkDestroyDebugUtilsMessengerEXT, so it has that signature
            destroy: unsafe {
                std::mem::transmute::<
                    unsafe extern "system" fn(),
                    vk::PFN_vkDestroyDebugUtilsMessengerEXT,
                >(destroy)
            },
        })
    }
}

/// A live debug messenger plus the functions needed to tear it down.
#[derive(Debug, Clone, Copy)]
pub struct DebugChannel {
    handle: vk::DebugUtilsMessengerEXT,
    fns: DebugUtilsFns,
}

impl DebugChannel {
    pub fn raw_handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.handle
    }

    /// Destroys the messenger.
    ///
    /// # Safety
    /// `instance` must be the live instance the messenger was created from.
    pub unsafe fn destroy(self, instance: vk::Instance) {
        tracing::debug!("Destroying debug messenger {:?}", self.handle);
        //SAFETY: fns were resolved for instance, which the caller guarantees
        //is alive and the parent of this messenger
        unsafe { (self.fns.destroy)(instance, self.handle, std::ptr::null()) };
    }
}

/// Installs the debug messenger on the instance in `state`.
///
/// Fails with [`DebugError::InstanceNotInitialized`] when called before the
/// instance exists.
pub fn setup_debug_channel<D: Driver + ?Sized>(
    driver: &D,
    state: &mut RuntimeState,
    config: &DebugMessengerConfig,
) -> Result<(), DebugError> {
    let _span = tracing::debug_span!("setup_debug_channel").entered();

    let Some(instance) = state.instance else {
        tracing::error!(
            "Cannot create Vulkan message callback before creating VkInstance!"
        );
        return Err(DebugError::InstanceNotInitialized);
    };
    if state.debug_channel.is_some() {
        return Err(DebugError::AlreadyInstalled);
    }

    let fns = DebugUtilsFns::resolve(driver, instance)?;
    let create_info = config.create_info();
    let mut handle = vk::DebugUtilsMessengerEXT::null();

    //SAFETY: create was resolved for this instance, create_info is valid
    //and handle is a writable location for the result
    unsafe { (fns.create)(instance, &create_info, std::ptr::null(), &mut handle) }
        .result()
        .map_err(|e| {
            tracing::error!("Failed to set up Vulkan debug messenger: {e}");
            DebugError::Creation(e)
        })?;

    tracing::debug!("Set up Vulkan debug messenger {:?}", handle);
    state.debug_channel = Some(DebugChannel { handle, fns });
    Ok(())
}

/// Destroys the debug messenger in `state`, if there is one.
///
/// A no-op when no messenger was ever installed.
pub fn teardown_debug_channel(state: &mut RuntimeState) -> Result<(), DebugError> {
    let Some(channel) = state.debug_channel.take() else {
        return Ok(());
    };
    let Some(instance) = state.instance else {
        tracing::error!(
            "Debug messenger {:?} outlived its instance",
            channel.raw_handle()
        );
        return Err(DebugError::InstanceNotInitialized);
    };
    //SAFETY: the channel was created from state.instance, which is still
    //alive because instances are destroyed after debug channels
    unsafe { channel.destroy(instance) };
    Ok(())
}
