quantity!(WattHours, f64, "Wh");
