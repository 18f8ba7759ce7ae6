quantity!(Watts, f64, "W");

impl Watts {
    /// Whole watts as the device expects them in a setpoint path segment.
    #[must_use]
    pub fn to_setpoint(self) -> String {
        format!("{:.0}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setpoint_is_rounded() {
        assert_eq!(Watts(800.0).to_setpoint(), "800");
        assert_eq!(Watts(799.6).to_setpoint(), "800");
        assert_eq!(Watts::ZERO.to_setpoint(), "0");
    }

    #[test]
    fn ordering_ok() {
        assert!(Watts(1.0) < Watts(2.0));
        assert_eq!(Watts(3.0).max(Watts(2.0)), Watts(3.0));
        assert_eq!(-Watts(3.0), Watts(-3.0));
    }
}
