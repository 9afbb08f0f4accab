use std::collections::BTreeSet;

use ash::{prelude::VkResult, vk};

/// Which queue families graphics and presentation will use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Complete, and one family does both jobs.
    pub fn is_ideal(&self) -> bool {
        self.is_complete() && self.graphics == self.present
    }

    /// The distinct families in ascending order.
    pub fn unique_families(&self) -> BTreeSet<u32> {
        self.graphics.into_iter().chain(self.present).collect()
    }
}

/// Picks graphics and present families from `families`.
///
/// `present_support(i)` reports whether family `i` can present to the target
/// surface. A family that does both is preferred: graphics moves to a family
/// that also presents, and present moves to the graphics family. Scanning
/// stops as soon as a single family covers both.
pub fn resolve_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut present_support: F,
) -> VkResult<QueueFamilyIndices>
where
    F: FnMut(u32) -> VkResult<bool>,
{
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families) {
        let presents = present_support(index)?;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && (indices.graphics.is_none() || presents)
        {
            indices.graphics = Some(index);
        }
        if presents
            && (indices.present.is_none() || indices.graphics == Some(index))
        {
            indices.present = Some(index);
        }

        if indices.is_ideal() {
            break;
        }
    }

    Ok(indices)
}
