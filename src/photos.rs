use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::util::image_mime_type;

#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl Photo {
    /// Wrap uploaded bytes, or `None` if they are not a recognised image.
    pub fn from_upload(bytes: Bytes) -> Option<Self> {
        let mime_type = image_mime_type(&bytes)?.to_string();
        Some(Self { mime_type, bytes })
    }
}

type ReleaseHook = Box<dyn FnOnce(usize) + Send>;

/// Photo bytes of one request. Held behind an `Arc` by every consumer; the
/// bytes are released once, when the last holder drops its handle.
pub struct PhotoSet {
    pub self_photo: Option<Photo>,
    pub aesthetic: Vec<Photo>,
    on_release: Mutex<Option<ReleaseHook>>,
}

impl PhotoSet {
    #[cfg(test)]
    pub fn new(self_photo: Option<Photo>, aesthetic: Vec<Photo>) -> Arc<Self> {
        Arc::new(Self { self_photo, aesthetic, on_release: Mutex::new(None) })
    }

    /// Photo set whose `hook` runs once with the released byte count.
    pub fn with_release_hook(
        self_photo: Option<Photo>,
        aesthetic: Vec<Photo>,
        hook: impl FnOnce(usize) + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self { self_photo, aesthetic, on_release: Mutex::new(Some(Box::new(hook))) })
    }

    pub fn has_self_photo(&self) -> bool { self.self_photo.is_some() }

    pub fn aesthetic_count(&self) -> usize { self.aesthetic.len() }

    pub fn total_bytes(&self) -> usize {
        self.self_photo.iter().chain(self.aesthetic.iter()).map(|p| p.bytes.len()).sum()
    }
}

impl Drop for PhotoSet {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.get_mut().take() {
            hook(self.total_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn release_runs_once_after_last_holder() {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let photo = Photo::from_upload(Bytes::from_static(PNG)).unwrap();
        let set = PhotoSet::with_release_hook(Some(photo), Vec::new(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let other = set.clone();
        drop(set);
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        assert!(other.has_self_photo());
        drop(other);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_non_image_uploads() {
        assert!(Photo::from_upload(Bytes::from_static(b"%PDF-1.4")).is_none());
    }
}
