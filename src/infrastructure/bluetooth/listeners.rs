//! Device listener set.
//!
//! Listeners are told about every discovered device, the connected device, and
//! `None` once the connection is gone.

use crate::domain::models::Device;
use std::sync::{Arc, Mutex};

pub type ListenerFn = dyn Fn(Option<&Device>) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<ListenerFn>)>,
}

#[derive(Clone, Default)]
pub struct DeviceListeners {
    inner: Arc<Mutex<ListenerSet>>,
}

impl DeviceListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Option<&Device>) + Send + Sync + 'static,
    {
        let mut set = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let id = ListenerId(set.next_id);
        set.next_id += 1;
        set.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut set = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let before = set.listeners.len();
        set.listeners.retain(|(lid, _)| *lid != id);
        set.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .listeners
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, device: Option<&Device>) {
        // call outside the lock so a listener may remove itself
        let snapshot: Vec<Arc<ListenerFn>> = self
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .listeners
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();

        for listener in snapshot {
            listener(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_add_remove() {
        let listeners = DeviceListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = listeners.add(move |device| {
            sink.lock().unwrap().push(device.map(|d| d.name.clone()));
        });
        assert_eq!(listeners.len(), 1);

        let device = Device {
            id: "AA:BB".to_string(),
            name: "Glucose Meter".to_string(),
            ..Device::default()
        };
        listeners.notify(Some(&device));
        listeners.notify(None);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.notify(Some(&device));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("Glucose Meter".to_string()), None]
        );
    }

    #[test]
    fn test_listener_can_remove_itself() {
        let listeners = DeviceListeners::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let (handle, counter, own_id) = (listeners.clone(), calls.clone(), slot.clone());
        let id = listeners.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id.lock().unwrap() {
                handle.remove(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        listeners.notify(None);
        listeners.notify(None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }
}
