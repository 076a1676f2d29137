use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use opencv::core::Mat;
use opencv::prelude::*;

use crate::error::CapabilityError;
use crate::helmet::HelmetClassifier;
use crate::plate::PlateReader;

/// Bounds every call of the wrapped capability by `timeout`.
///
/// The call runs on its own thread with a private copy of the crop. When the
/// deadline passes the caller gets `CapabilityError::Timeout` and the thread
/// is left to finish on its own; its late answer is discarded.
pub struct Deadline<C: ?Sized> {
    inner: Arc<C>,
    timeout: Duration,
}

impl<C: ?Sized + Send + Sync + 'static> Deadline<C> {
    pub fn new(inner: Arc<C>, timeout: Duration) -> Self {
        Deadline { inner, timeout }
    }

    fn call<T: Send + 'static>(
        &self,
        crop: &Mat,
        f: fn(&C, &Mat) -> Result<T, CapabilityError>,
    ) -> Result<T, CapabilityError> {
        let crop = crop.try_clone()?;
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("capability-call".to_string())
            .spawn(move || {
                let _ = tx.send(f(&*inner, &crop));
            })
            .map_err(|e| CapabilityError::Backend(format!("spawn failed: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CapabilityError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CapabilityError::Backend(
                "capability worker exited without an answer".to_string(),
            )),
        }
    }
}

impl<C: PlateReader + ?Sized + 'static> PlateReader for Deadline<C> {
    fn read(&self, crop: &Mat) -> Result<String, CapabilityError> {
        self.call(crop, |c, m| c.read(m))
    }
}

impl<C: HelmetClassifier + ?Sized + 'static> HelmetClassifier for Deadline<C> {
    fn infer(&self, crop: &Mat) -> Result<bool, CapabilityError> {
        self.call(crop, |c, m| c.infer(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Size, CV_8UC3};

    struct SlowReader(Duration);

    impl PlateReader for SlowReader {
        fn read(&self, _crop: &Mat) -> Result<String, CapabilityError> {
            thread::sleep(self.0);
            Ok("KA05MH1234".to_string())
        }
    }

    struct PanickyHelmet;

    impl HelmetClassifier for PanickyHelmet {
        fn infer(&self, _crop: &Mat) -> Result<bool, CapabilityError> {
            panic!("model crashed")
        }
    }

    fn crop() -> Mat {
        Mat::new_size_with_default(Size::new(8, 8), CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_fast_call_passes_through() {
        let reader = Deadline::new(Arc::new(SlowReader(Duration::ZERO)), Duration::from_secs(2));
        assert_eq!(reader.read(&crop()).unwrap(), "KA05MH1234");
    }

    #[test]
    fn test_slow_call_times_out() {
        let reader = Deadline::new(
            Arc::new(SlowReader(Duration::from_millis(500))),
            Duration::from_millis(20),
        );
        let err = reader.read(&crop()).unwrap_err();
        assert!(matches!(err, CapabilityError::Timeout(_)));
    }

    #[test]
    fn test_crashed_worker_is_a_failure_not_a_hang() {
        let helmet = Deadline::new(Arc::new(PanickyHelmet), Duration::from_secs(2));
        assert!(helmet.infer(&crop()).is_err());
    }

    #[test]
    fn test_works_with_trait_objects() {
        let inner: Arc<dyn PlateReader> = Arc::new(SlowReader(Duration::ZERO));
        let reader = Deadline::new(inner, Duration::from_secs(1));
        assert!(reader.read(&crop()).is_ok());
    }
}
