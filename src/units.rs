//! This module defines the unit types used for initial and boundary conditions.
//!
//! Observed concentrations are reported in mg/L, whereas the solver works in kg/m³, so the
//! conversion between the two is kept in one place.

macro_rules! unit_struct {
    ($name:ident, $symbol:literal) => {
        /// Represents a type of quantity.
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, derive_more::Add)]
        pub struct $name(pub f64);

        impl $name {
            /// Returns the value of the unit type as a f64.
            pub fn value(self) -> f64 {
                self.0
            }

            /// The mean of an iterator of values, or `None` if it is empty
            pub fn mean<I: IntoIterator<Item = $name>>(iter: I) -> Option<$name> {
                let (sum, count) = iter
                    .into_iter()
                    .fold(($name(0.0), 0_usize), |(sum, count), x| (sum + x, count + 1));
                (count > 0).then(|| $name(sum.0 / count as f64))
            }
        }

        impl From<f64> for $name {
            fn from(val: f64) -> Self {
                Self(val)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{} {}", self.0, $symbol)
            }
        }
    };
}

unit_struct!(Metres, "m");
unit_struct!(CubicMetresPerSecond, "m3/s");
unit_struct!(MilligramsPerLitre, "mg/l");
unit_struct!(KilogramsPerCubicMetre, "kg/m3");

impl From<MilligramsPerLitre> for KilogramsPerCubicMetre {
    fn from(val: MilligramsPerLitre) -> Self {
        // 1 mg/L = 1 g/m³ = 1e-3 kg/m³
        Self(val.0 / 1000.0)
    }
}

impl CubicMetresPerSecond {
    /// Clamp to zero: a discharge boundary cannot extract water
    pub fn non_negative(self) -> Self {
        if self.0 < 0.0 { Self(0.0) } else { self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(12.5, 0.0125)]
    #[case(3.0, 0.003)]
    fn test_mg_per_litre_to_kg_per_m3(#[case] input: f64, #[case] expected: f64) {
        let converted: KilogramsPerCubicMetre = MilligramsPerLitre(input).into();
        assert_eq!(converted.value(), input / 1000.0);
        assert!((converted.value() - expected).abs() < 1e-15);
    }

    #[rstest]
    #[case(-3.2, 0.0)]
    #[case(0.0, 0.0)]
    #[case(4.5, 4.5)]
    fn test_non_negative(#[case] input: f64, #[case] expected: f64) {
        assert_eq!(CubicMetresPerSecond(input).non_negative().value(), expected);
    }

    #[test]
    fn test_mean() {
        assert_eq!(Metres::mean([Metres(1.0), Metres(2.0)]), Some(Metres(1.5)));
        assert_eq!(Metres::mean(Vec::new()), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(KilogramsPerCubicMetre(0.5).to_string(), "0.5 kg/m3");
    }
}
