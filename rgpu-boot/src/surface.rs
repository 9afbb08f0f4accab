use std::ffi::CStr;

use ash::vk;
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use thiserror::Error;

use crate::driver::Driver;
use crate::state::RuntimeState;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Couldn't get display handle: {0}")]
    InvalidDisplayHandle(crate::RwhHandleError),
    #[error("Couldn't get window handle: {0}")]
    InvalidWindowHandle(crate::RwhHandleError),
    #[error("Could not enumerate required instance extensions: {0}")]
    RequiredExtensions(vk::Result),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Cannot create a surface before the instance exists")]
    InstanceNotInitialized,
    #[error("A surface was already created for this runtime state")]
    AlreadyCreated,
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("Vulkan surface creation failed: {0}")]
    Creation(vk::Result),
}

/// What the bootstrap needs from the windowing library.
///
/// Implemented for anything that hands out raw window and display handles,
/// which covers `winit` windows.
pub trait WindowSystem {
    /// Instance extensions the platform needs to create a surface for this
    /// window.
    fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError>;

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), WindowError>;
}

impl<T: HasDisplayHandle + HasWindowHandle> WindowSystem for T {
    fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError> {
        let display = self
            .display_handle()
            .map_err(WindowError::InvalidDisplayHandle)?
            .as_raw();
        let exts = ash_window::enumerate_required_extensions(display)
            .map_err(WindowError::RequiredExtensions)?;

        Ok(exts
            .iter()
            //SAFETY: ash_window promises to hand us null terminated C
            //strings with static lifetime
            .map(|ext_cstr_ptr| unsafe { CStr::from_ptr(*ext_cstr_ptr) })
            .map(|ext| ext.to_string_lossy().into_owned())
            .collect())
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle), WindowError> {
        let display = self
            .display_handle()
            .map_err(WindowError::InvalidDisplayHandle)?
            .as_raw();
        let window = self
            .window_handle()
            .map_err(WindowError::InvalidWindowHandle)?
            .as_raw();
        Ok((display, window))
    }
}

/// Creates the presentation surface for `window` and stores it in `state`.
///
/// The window must outlive the surface; [`cleanup`](crate::state::cleanup)
/// destroys the surface before the instance, and the caller drops the window
/// after that.
pub fn create_surface<D: Driver + ?Sized>(
    driver: &mut D,
    state: &mut RuntimeState,
    window: &dyn WindowSystem,
) -> Result<vk::SurfaceKHR, SurfaceError> {
    let _span = tracing::debug_span!("create_surface").entered();

    let Some(instance) = state.instance else {
        tracing::error!("Cannot create a surface before creating the instance!");
        return Err(SurfaceError::InstanceNotInitialized);
    };
    if state.surface.is_some() {
        return Err(SurfaceError::AlreadyCreated);
    }

    let (display, raw_window) = window.raw_handles()?;
    let surface = driver
        .create_surface(instance, display, raw_window)
        .map_err(SurfaceError::Creation)?;

    tracing::debug!("Created surface {:?}", surface);
    state.surface = Some(surface);
    Ok(surface)
}
