quantity!(Percent, f64, "%");
