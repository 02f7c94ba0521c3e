//! Fixed-function render state values.

// ============================================================================
// Viewport
// ============================================================================

/// Viewport rectangle and depth range.
///
/// Depth uses the `[0, 1]` convention. A viewport is only accepted by a
/// render pass when its extent is positive and
/// `0 <= min_depth <= max_depth <= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Viewport {
    /// Create a new viewport with the full `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Create a viewport from dimensions with origin at (0, 0).
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// Describe why this viewport is unusable, if it is.
    pub fn check(&self) -> Result<(), String> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(format!(
                "viewport extent {}x{} must be positive",
                self.width, self.height
            ));
        }
        let depth_ok = 0.0 <= self.min_depth
            && self.min_depth <= self.max_depth
            && self.max_depth <= 1.0;
        if !depth_ok {
            return Err(format!(
                "viewport depth range [{}, {}] must satisfy 0 <= min <= max <= 1",
                self.min_depth, self.max_depth
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Scissor Rectangle
// ============================================================================

/// Scissor rectangle for clipping rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// RGBA color, used for the blend constant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_check() {
        assert!(Viewport::from_dimensions(640, 480).check().is_ok());
        assert!(Viewport::new(0.0, 0.0, 0.0, 10.0).check().is_err());
        assert!(
            Viewport::from_dimensions(8, 8)
                .with_depth_range(0.6, 0.4)
                .check()
                .is_err()
        );
        assert!(
            Viewport::from_dimensions(8, 8)
                .with_depth_range(0.0, 1.5)
                .check()
                .is_err()
        );
    }

    #[test]
    fn test_nan_extent_rejected() {
        assert!(Viewport::new(0.0, 0.0, f32::NAN, 4.0).check().is_err());
    }
}
