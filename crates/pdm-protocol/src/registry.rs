//! Device registry

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::device::PdmDevice;

/// A device shared between the comms loops and the application
pub type SharedDevice = Arc<Mutex<PdmDevice>>;

/// Lookup of the devices the pipeline routes frames to
pub trait DeviceRegistry: Send + Sync {
    fn get_device(&self, id: Uuid) -> Option<SharedDevice>;

    fn get_all_devices(&self) -> Vec<SharedDevice>;
}

/// In-memory registry
#[derive(Default)]
pub struct DeviceManager {
    devices: RwLock<Vec<(Uuid, SharedDevice)>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, device: PdmDevice) -> SharedDevice {
        let id = device.id();
        info!(device = %device.name, base_id = device.base_id(), "Registered device");
        let shared = Arc::new(Mutex::new(device));
        self.devices.write().push((id, shared.clone()));
        shared
    }

    pub fn remove(&self, id: Uuid) -> Option<SharedDevice> {
        let mut devices = self.devices.write();
        let position = devices.iter().position(|(device_id, _)| *device_id == id)?;
        Some(devices.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

impl DeviceRegistry for DeviceManager {
    fn get_device(&self, id: Uuid) -> Option<SharedDevice> {
        self.devices
            .read()
            .iter()
            .find(|(device_id, _)| *device_id == id)
            .map(|(_, device)| device.clone())
    }

    fn get_all_devices(&self) -> Vec<SharedDevice> {
        self.devices
            .read()
            .iter()
            .map(|(_, device)| device.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PdmKind;

    #[test]
    fn test_add_get_remove() {
        let manager = DeviceManager::new();
        let device = PdmDevice::new("rear", PdmKind::Standard, 500).unwrap();
        let id = device.id();
        manager.add(device);

        assert_eq!(manager.len(), 1);
        let found = manager.get_device(id).unwrap();
        assert_eq!(found.lock().name, "rear");
        assert_eq!(manager.get_all_devices().len(), 1);

        assert!(manager.remove(id).is_some());
        assert!(manager.get_device(id).is_none());
        assert!(manager.is_empty());
        assert!(manager.remove(id).is_none());
    }
}
