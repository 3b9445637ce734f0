// wb-core/src/units.rs

use uom::si::f64::{Area as UomArea, Length as UomLength, Ratio as UomRatio, Volume as UomVolume};

// Public canonical unit types (SI, f64)
pub type Area = UomArea;
pub type Length = UomLength;
pub type Ratio = UomRatio;
pub type Volume = UomVolume;

#[inline]
pub fn m3(v: f64) -> Volume {
    use uom::si::volume::cubic_meter;
    Volume::new::<cubic_meter>(v)
}

#[inline]
pub fn m2(v: f64) -> Area {
    use uom::si::area::square_meter;
    Area::new::<square_meter>(v)
}

#[inline]
pub fn mm(v: f64) -> Length {
    use uom::si::length::millimeter;
    Length::new::<millimeter>(v)
}

#[inline]
pub fn percent(v: f64) -> Ratio {
    use uom::si::ratio::percent;
    Ratio::new::<percent>(v)
}

#[inline]
pub fn as_m3(v: Volume) -> f64 {
    use uom::si::volume::cubic_meter;
    v.get::<cubic_meter>()
}

/// Volume of water represented by a depth over a horizontal surface.
///
/// Used for both rainfall onto and evaporation from open water:
/// `depth_mm / 1000 * area_m2`.
#[inline]
pub fn depth_over_area(depth: Length, area: Area) -> Volume {
    depth * area
}

/// Fraction of a volume given as a percent rate.
#[inline]
pub fn fraction_of(volume: Volume, rate: Ratio) -> Volume {
    use uom::si::ratio::ratio;
    volume * rate.get::<ratio>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_over_area_is_mm_over_thousand() {
        let v = depth_over_area(mm(45.2), m2(50_000.0));
        assert!((as_m3(v) - 2260.0).abs() < 1e-9);
    }

    #[test]
    fn fraction_of_percent_rate() {
        let v = fraction_of(m3(10_000.0), percent(0.5));
        assert!((as_m3(v) - 50.0).abs() < 1e-9);
    }
}
