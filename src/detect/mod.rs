//! Object detection: enhanced plane in, object map out.

mod otsu;

pub use self::otsu::OtsuDetector;
pub use crate::objects::Connectivity;
