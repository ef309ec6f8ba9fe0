//! Physical device selection.

use std::ffi::CStr;

use ash::vk;
use thiserror::Error;

use crate::capability;
use crate::instance::Instance;
use crate::queue::{self, QueueFamily};
use crate::surface::Surface;

/// Selection errors.
#[derive(Error, Debug)]
pub enum SelectionError {
    /// Device enumeration itself failed.
    #[error("failed to enumerate physical devices: {0}")]
    EnumerationFailed(vk::Result),

    /// The system reports no physical device at all.
    #[error("no physical device found")]
    NoPhysicalDeviceFound,

    /// No enumerated device satisfies the criteria.
    #[error("no physical device satisfies the selection criteria")]
    NoSuitableDevice,
}

/// The kind of graphics hardware behind a physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Other,
    Integrated,
    Discrete,
    Virtual,
    Cpu,
}

impl From<vk::PhysicalDeviceType> for DeviceType {
    fn from(raw: vk::PhysicalDeviceType) -> Self {
        match raw {
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }
}

/// Everything known about one physical device at enumeration time.
///
/// Populated once, read-only afterward. Only the selected description
/// survives selection.
#[derive(Debug)]
pub struct PhysicalDeviceDescription {
    /// Raw physical device handle.
    pub handle: vk::PhysicalDevice,
    /// Device name reported by the driver.
    pub name: String,
    /// Hardware classification.
    pub device_type: DeviceType,
    /// Supported feature set.
    pub features: vk::PhysicalDeviceFeatures,
    /// Full device properties.
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heap layout.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue families in enumeration order.
    pub queue_families: Vec<QueueFamily>,
}

impl PhysicalDeviceDescription {
    /// Whether a compute-only queue family exists.
    pub fn has_dedicated_compute_queue(&self) -> bool {
        queue::dedicated_compute_index(&self.queue_families).is_some()
    }

    /// Whether a transfer-only queue family exists.
    pub fn has_dedicated_transfer_queue(&self) -> bool {
        queue::dedicated_transfer_index(&self.queue_families).is_some()
    }

    /// Whether a non-graphics compute queue family exists.
    pub fn has_separated_compute_queue(&self) -> bool {
        queue::separated_compute_index(&self.queue_families).is_some()
    }

    /// Whether a non-graphics transfer queue family exists.
    pub fn has_separated_transfer_queue(&self) -> bool {
        queue::separated_transfer_index(&self.queue_families).is_some()
    }
}

/// Requirements and preferences for device selection.
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub preferred_type: DeviceType,
    pub allow_any_type: bool,
    pub require_present: bool,
    pub require_dedicated_compute: bool,
    pub require_dedicated_transfer: bool,
    pub require_separated_compute: bool,
    pub require_separated_transfer: bool,
    pub select_first: bool,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            preferred_type: DeviceType::Discrete,
            allow_any_type: true,
            require_present: true,
            require_dedicated_compute: false,
            require_dedicated_transfer: false,
            require_separated_compute: false,
            require_separated_transfer: false,
            select_first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suitability {
    Yes,
    Partial,
    No,
}

/// Single-shot physical device selector.
///
/// Configure through the chained setters, then consume with [`select`].
///
/// [`select`]: DeviceSelector::select
pub struct DeviceSelector<'a> {
    instance: &'a Instance,
    surface: Option<&'a Surface>,
    criteria: SelectionCriteria,
}

impl<'a> DeviceSelector<'a> {
    /// Create a selector over an instance.
    pub fn new(instance: &'a Instance) -> Self {
        Self {
            instance,
            surface: None,
            criteria: SelectionCriteria::default(),
        }
    }

    /// Set the surface the selected device must render to.
    pub fn surface(mut self, surface: &'a Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Set the preferred hardware type.
    pub fn preferred_type(mut self, device_type: DeviceType) -> Self {
        self.criteria.preferred_type = device_type;
        self
    }

    /// Allow devices of any hardware type as partial matches.
    pub fn allow_any_type(mut self, allow: bool) -> Self {
        self.criteria.allow_any_type = allow;
        self
    }

    /// Require a present-capable queue family.
    pub fn require_present(mut self, require: bool) -> Self {
        self.criteria.require_present = require;
        self
    }

    /// Require a compute-only queue family.
    pub fn require_dedicated_compute(mut self) -> Self {
        self.criteria.require_dedicated_compute = true;
        self
    }

    /// Require a transfer-only queue family.
    pub fn require_dedicated_transfer(mut self) -> Self {
        self.criteria.require_dedicated_transfer = true;
        self
    }

    /// Require a compute-capable family without graphics.
    pub fn require_separated_compute(mut self) -> Self {
        self.criteria.require_separated_compute = true;
        self
    }

    /// Require a transfer-capable family without graphics.
    pub fn require_separated_transfer(mut self) -> Self {
        self.criteria.require_separated_transfer = true;
        self
    }

    /// Skip classification and take the first enumerated device.
    pub fn select_first(mut self) -> Self {
        self.criteria.select_first = true;
        self
    }

    /// Enumerate, classify and pick the best physical device.
    pub fn select(self) -> Result<PhysicalDeviceDescription, SelectionError> {
        // SAFETY: the instance is valid for the selector's lifetime.
        let devices = unsafe { self.instance.handle().enumerate_physical_devices() }
            .map_err(SelectionError::EnumerationFailed)?;

        if devices.is_empty() {
            return Err(SelectionError::NoPhysicalDeviceFound);
        }

        let descriptions: Vec<PhysicalDeviceDescription> = devices
            .into_iter()
            .map(|device| {
                // SAFETY: handles come from this instance.
                unsafe { describe(self.instance.handle(), device, self.surface) }
            })
            .collect();

        let selected = pick(descriptions, &self.criteria)?;
        tracing::info!(
            "selected physical device: {} ({:?})",
            selected.name,
            selected.device_type
        );

        Ok(selected)
    }
}

/// Populate a description for one device. No filtering happens here.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn describe(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<&Surface>,
) -> PhysicalDeviceDescription {
    // SAFETY: guaranteed by the caller.
    let (properties, features, memory_properties) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_features(device),
            instance.get_physical_device_memory_properties(device),
        )
    };

    // SAFETY: the driver nul-terminates the name array.
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    // SAFETY: guaranteed by the caller.
    let queue_families = unsafe { capability::queue_families(instance, device, surface) };

    PhysicalDeviceDescription {
        handle: device,
        name,
        device_type: properties.device_type.into(),
        features,
        properties,
        memory_properties,
        queue_families,
    }
}

/// Pick a device from the populated descriptions.
///
/// The first full match short-circuits; otherwise the last partial match
/// wins. `select_first` bypasses classification entirely.
fn pick(
    mut descriptions: Vec<PhysicalDeviceDescription>,
    criteria: &SelectionCriteria,
) -> Result<PhysicalDeviceDescription, SelectionError> {
    if criteria.select_first {
        return Ok(descriptions.swap_remove(0));
    }

    let mut chosen = None;
    for index in 0..descriptions.len() {
        match classify(&descriptions[index], criteria) {
            Suitability::Yes => {
                chosen = Some(index);
                break;
            }
            Suitability::Partial => chosen = Some(index),
            Suitability::No => {}
        }
    }

    chosen
        .map(|index| descriptions.swap_remove(index))
        .ok_or(SelectionError::NoSuitableDevice)
}

fn classify(desc: &PhysicalDeviceDescription, criteria: &SelectionCriteria) -> Suitability {
    if criteria.require_present && queue::present_index(&desc.queue_families).is_none() {
        return Suitability::No;
    }
    if criteria.require_dedicated_compute && !desc.has_dedicated_compute_queue() {
        return Suitability::No;
    }
    if criteria.require_dedicated_transfer && !desc.has_dedicated_transfer_queue() {
        return Suitability::No;
    }
    if criteria.require_separated_compute && !desc.has_separated_compute_queue() {
        return Suitability::No;
    }
    if criteria.require_separated_transfer && !desc.has_separated_transfer_queue() {
        return Suitability::No;
    }

    if desc.device_type == criteria.preferred_type {
        Suitability::Yes
    } else if criteria.allow_any_type {
        Suitability::Partial
    } else {
        Suitability::No
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueOps;

    fn desc(name: &str, device_type: DeviceType, ops_per_family: &[QueueOps]) -> PhysicalDeviceDescription {
        PhysicalDeviceDescription {
            handle: vk::PhysicalDevice::null(),
            name: name.to_string(),
            device_type,
            features: vk::PhysicalDeviceFeatures::default(),
            properties: vk::PhysicalDeviceProperties::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_families: ops_per_family
                .iter()
                .enumerate()
                .map(|(index, &ops)| QueueFamily {
                    index: index as u32,
                    ops,
                    count: 1,
                })
                .collect(),
        }
    }

    fn universal() -> Vec<QueueOps> {
        vec![QueueOps::GRAPHICS | QueueOps::COMPUTE | QueueOps::TRANSFER | QueueOps::PRESENT]
    }

    #[test]
    fn full_match_beats_earlier_partial() {
        // {no, partial, yes} in enumeration order.
        let descriptions = vec![
            desc("no-present", DeviceType::Discrete, &[QueueOps::GRAPHICS]),
            desc("integrated", DeviceType::Integrated, &universal()),
            desc("discrete", DeviceType::Discrete, &universal()),
        ];

        let picked = pick(descriptions, &SelectionCriteria::default()).unwrap();
        assert_eq!(picked.name, "discrete");
    }

    #[test]
    fn last_partial_wins_without_full_match() {
        let descriptions = vec![
            desc("first-partial", DeviceType::Integrated, &universal()),
            desc("second-partial", DeviceType::Cpu, &universal()),
            desc("no-present", DeviceType::Discrete, &[QueueOps::GRAPHICS]),
        ];

        let picked = pick(descriptions, &SelectionCriteria::default()).unwrap();
        assert_eq!(picked.name, "second-partial");
    }

    #[test]
    fn nothing_suitable_is_an_error() {
        let descriptions = vec![desc(
            "no-present",
            DeviceType::Discrete,
            &[QueueOps::GRAPHICS],
        )];

        let err = pick(descriptions, &SelectionCriteria::default()).unwrap_err();
        assert!(matches!(err, SelectionError::NoSuitableDevice));
    }

    #[test]
    fn select_first_bypasses_classification() {
        let criteria = SelectionCriteria {
            select_first: true,
            ..Default::default()
        };
        // Device 0 would classify as No; select_first takes it anyway.
        let descriptions = vec![
            desc("unsuitable", DeviceType::Cpu, &[QueueOps::TRANSFER]),
            desc("discrete", DeviceType::Discrete, &universal()),
        ];

        let picked = pick(descriptions, &criteria).unwrap();
        assert_eq!(picked.name, "unsuitable");
    }

    #[test]
    fn type_mismatch_is_fatal_when_any_type_disallowed() {
        let criteria = SelectionCriteria {
            allow_any_type: false,
            ..Default::default()
        };
        let descriptions = vec![desc("integrated", DeviceType::Integrated, &universal())];

        let err = pick(descriptions, &criteria).unwrap_err();
        assert!(matches!(err, SelectionError::NoSuitableDevice));
    }

    #[test]
    fn dedicated_compute_requirement_filters() {
        let criteria = SelectionCriteria {
            require_dedicated_compute: true,
            ..Default::default()
        };

        // Compute shares a family with graphics everywhere: rejected.
        let rejected = desc("shared", DeviceType::Discrete, &universal());
        assert_eq!(classify(&rejected, &criteria), Suitability::No);

        let mut families = universal();
        families.push(QueueOps::COMPUTE);
        let accepted = desc("split", DeviceType::Discrete, &families);
        assert_eq!(classify(&accepted, &criteria), Suitability::Yes);
    }

    #[test]
    fn separated_transfer_requirement_filters() {
        let criteria = SelectionCriteria {
            require_separated_transfer: true,
            ..Default::default()
        };

        let rejected = desc("shared", DeviceType::Discrete, &universal());
        assert_eq!(classify(&rejected, &criteria), Suitability::No);

        let mut families = universal();
        families.push(QueueOps::TRANSFER | QueueOps::COMPUTE);
        let accepted = desc("split", DeviceType::Discrete, &families);
        assert_eq!(classify(&accepted, &criteria), Suitability::Yes);
    }
}
