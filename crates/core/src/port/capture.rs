// Visual Capture Port

use crate::domain::Target;
use crate::port::measurement::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Named browser viewport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Desktop, tablet and mobile
    pub fn defaults() -> Vec<Viewport> {
        vec![
            Viewport::new("desktop", 1920, 1080),
            Viewport::new("tablet", 768, 1024),
            Viewport::new("mobile", 375, 667),
        ]
    }

    /// Parse `name:WIDTHxHEIGHT`
    pub fn parse(spec: &str) -> Option<Viewport> {
        let (name, dims) = spec.trim().split_once(':')?;
        let (w, h) = dims.split_once('x')?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        if name.trim().is_empty() || width == 0 || height == 0 {
            return None;
        }
        Some(Viewport::new(name.trim(), width, height))
    }
}

/// Captured screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    /// Where the capability persisted the image, if it did
    pub location: Option<String>,
}

/// Screenshot capability, invoked once per (target, viewport)
#[async_trait]
pub trait VisualCapture: Send + Sync {
    async fn capture(
        &self,
        target: &Target,
        viewport: &Viewport,
    ) -> Result<CapturedImage, CapabilityError>;

    /// Remove an image persisted at `location` (job deletion)
    async fn discard(&self, location: &str) -> Result<(), CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_viewport() {
        assert_eq!(
            Viewport::parse("mobile:375x667"),
            Some(Viewport::new("mobile", 375, 667))
        );
        assert_eq!(Viewport::parse("mobile"), None);
        assert_eq!(Viewport::parse("mobile:0x667"), None);
        assert_eq!(Viewport::parse(":375x667"), None);
    }
}
