//! This module defines the unit types used for values read from solution files.
use serde::{Deserialize, Serialize};
use std::iter::Sum;

macro_rules! unit_struct {
    ($name:ident) => {
        /// Represents a type of quantity.
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            PartialOrd,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::AddAssign,
            derive_more::Display,
        )]
        pub struct $name(pub f64);

        impl $name {
            /// Returns the value of the unit type as a f64.
            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> Sum<&'a $name> for $name {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                $name(iter.map(|x| x.0).sum())
            }
        }
    };
}

// Energy capacity of an installed technology (`E_in_` variables)
unit_struct!(Capacity);
// Power and auxiliary flows (`P_*` and `Q_*` variables)
unit_struct!(Flow);
// Equity, debt, liquidity and costs
unit_struct!(Money);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum() {
        let caps = [Capacity(1.5), Capacity(2.0)];
        assert_eq!(caps.iter().sum::<Capacity>(), Capacity(3.5));
        assert_eq!(caps.into_iter().sum::<Capacity>(), Capacity(3.5));
        assert_eq!(std::iter::empty::<Flow>().sum::<Flow>(), Flow::default());
    }

    #[test]
    fn test_add_assign() {
        let mut flow = Flow(1.0);
        flow += Flow(2.0);
        assert_eq!(flow.value(), 3.0);
    }
}
