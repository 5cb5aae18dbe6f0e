//! # Color maps
//!
//! Scalars are turned into colors with [`interpolate`]: the value is normalized between the
//! batch minimum and maximum, then placed between the two surrounding stops of a
//! [`ColorMap`]. Values that cannot be placed (NaN, outside `[min, max]`, or an empty batch
//! whose bounds are NaN) get [`MISSING_VALUE_COLOR`].
use itertools::{Itertools, MinMaxResult};

/// Linear RGBA color, components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Color {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Color { alpha, ..self }
    }

    fn lerp(&self, other: &Color, t: f32) -> Color {
        Color::new(
            self.red + (other.red - self.red) * t,
            self.green + (other.green - self.green) * t,
            self.blue + (other.blue - self.blue) * t,
            self.alpha + (other.alpha - self.alpha) * t,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    /// Position of the stop in `[0, 1]`
    pub position: f64,
    pub color: Color,
}

/// Ordered color stops; the first stop is at 0 and the last at 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMap {
    pub name: &'static str,
    pub stops: &'static [ColorStop],
}

/// Color of values that are missing or cannot be mapped
pub const MISSING_VALUE_COLOR: Color = Color::new(0.5, 0.5, 0.5, 1.0);

/// Perceptually uniform blue → green → yellow map
pub const DEFAULT_COLORMAP: ColorMap = ColorMap {
    name: "viridis",
    stops: &[
        ColorStop {
            position: 0.0,
            color: Color::new(68.0 / 255.0, 1.0 / 255.0, 84.0 / 255.0, 1.0),
        },
        ColorStop {
            position: 0.25,
            color: Color::new(59.0 / 255.0, 82.0 / 255.0, 139.0 / 255.0, 1.0),
        },
        ColorStop {
            position: 0.5,
            color: Color::new(33.0 / 255.0, 145.0 / 255.0, 140.0 / 255.0, 1.0),
        },
        ColorStop {
            position: 0.75,
            color: Color::new(94.0 / 255.0, 201.0 / 255.0, 98.0 / 255.0, 1.0),
        },
        ColorStop {
            position: 1.0,
            color: Color::new(253.0 / 255.0, 231.0 / 255.0, 37.0 / 255.0, 1.0),
        },
    ],
};

impl ColorMap {
    /// Color at normalized position `t` ∈ [0, 1]
    pub fn color_at(&self, t: f64) -> Color {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return MISSING_VALUE_COLOR;
        };
        if t <= first.position {
            return first.color;
        }
        if t >= last.position {
            return last.color;
        }
        self.stops
            .iter()
            .tuple_windows()
            .find(|(_, upper)| t <= upper.position)
            .map(|(lower, upper)| {
                let span = upper.position - lower.position;
                let fraction = if span > 0.0 {
                    (t - lower.position) / span
                } else {
                    0.0
                };
                lower.color.lerp(&upper.color, fraction as f32)
            })
            .unwrap_or(last.color)
    }
}

/// Map `value` onto `colormap` given the batch range `[min, max]`.
///
/// Arguments
/// ---------
/// * `value`: the scalar to color
/// * `min`, `max`: the batch bounds, as given by [`find_min_max`]
/// * `colormap`: the color stops
///
/// Return
/// ------
/// * the interpolated color, or [`MISSING_VALUE_COLOR`] when `value` cannot be placed
pub fn interpolate(value: f64, min: f64, max: f64, colormap: &ColorMap) -> Color {
    if value.is_nan() || min.is_nan() || max.is_nan() || value < min || value > max {
        return MISSING_VALUE_COLOR;
    }
    let t = if max > min {
        (value - min) / (max - min)
    } else {
        0.0
    };
    colormap.color_at(t)
}

/// Minimum and maximum of the valid values, ignoring `None` and NaN.
///
/// Return
/// ------
/// * `(min, max)`, or `(NaN, NaN)` when no valid value exists
pub fn find_min_max<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = Option<f64>>,
{
    match values
        .into_iter()
        .flatten()
        .filter(|x| !x.is_nan())
        .minmax_by(|a, b| a.total_cmp(b))
    {
        MinMaxResult::NoElements => (f64::NAN, f64::NAN),
        MinMaxResult::OneElement(x) => (x, x),
        MinMaxResult::MinMax(min, max) => (min, max),
    }
}
