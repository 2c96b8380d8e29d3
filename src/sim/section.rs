/// Real-power balance of one feeder section (switch area) for one timestep.
///
/// Sign convention follows the measurements:
/// - Load power is positive while consuming
/// - DER power is negative while injecting
#[derive(Debug, Clone)]
pub struct SectionBalance {
    name: String,
    load_w: f64,
    der_w: f64,
    load_count: usize,
    der_count: usize,
}

impl SectionBalance {
    /// Creates an empty balance labelled by the section's parent switch.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            load_w: 0.0,
            der_w: 0.0,
            load_count: 0,
            der_count: 0,
        }
    }

    /// Clears accumulated power and device counts.
    pub fn reset(&mut self) {
        self.load_w = 0.0;
        self.der_w = 0.0;
        self.load_count = 0;
        self.der_count = 0;
    }

    /// Adds the real power of one load.
    pub fn add_load_w(&mut self, w: f64) {
        self.load_w += w;
        self.load_count += 1;
    }

    /// Adds the real power of one DER inverter.
    pub fn add_der_w(&mut self, w: f64) {
        self.der_w += w;
        self.der_count += 1;
    }

    /// Total load real power in W.
    pub fn load_w(&self) -> f64 {
        self.load_w
    }

    /// Total DER real power in W.
    pub fn der_w(&self) -> f64 {
        self.der_w
    }

    /// Returns `true` once at least one load has been added.
    pub fn has_load(&self) -> bool {
        self.load_count > 0
    }

    /// Number of DER inverters added.
    pub fn der_count(&self) -> usize {
        self.der_count
    }

    /// Share of load left after DER contribution: `(load + der) / load`.
    ///
    /// `None` when the section has no loads or their total is zero.
    pub fn efficacy(&self) -> Option<f64> {
        if !self.has_load() || self.load_w == 0.0 {
            return None;
        }
        Some((self.load_w + self.der_w) / self.load_w)
    }

    /// Returns the section name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_section_defaults() {
        let section = SectionBalance::new("sw1");
        assert_eq!(section.name(), "sw1");
        assert_eq!(section.load_w(), 0.0);
        assert_eq!(section.der_w(), 0.0);
        assert!(!section.has_load());
        assert_eq!(section.efficacy(), None);
    }

    #[test]
    fn test_efficacy_with_der_injection() {
        let mut section = SectionBalance::new("sw1");
        section.add_load_w(3000.0);
        section.add_load_w(1000.0);
        section.add_der_w(-1000.0);
        assert_eq!(section.load_w(), 4000.0);
        assert_eq!(section.der_count(), 1);
        assert!((section.efficacy().unwrap_or_default() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_no_der_gives_unit_efficacy() {
        let mut section = SectionBalance::new("sw1");
        section.add_load_w(2500.0);
        assert_eq!(section.efficacy(), Some(1.0));
    }

    #[test]
    fn test_zero_load_total_has_no_efficacy() {
        let mut section = SectionBalance::new("sw1");
        section.add_load_w(0.0);
        section.add_der_w(-500.0);
        assert!(section.has_load());
        assert_eq!(section.efficacy(), None);
    }

    #[test]
    fn test_reset_clears_totals() {
        let mut section = SectionBalance::new("sw1");
        section.add_load_w(2.0);
        section.add_der_w(-1.0);
        section.reset();
        assert_eq!(section.load_w(), 0.0);
        assert_eq!(section.der_w(), 0.0);
        assert!(!section.has_load());
    }
}
