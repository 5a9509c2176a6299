use crate::normalize::fold;
use crate::types::{Alert, AlertLevel, ChangeEvent};

/// Region and type allow-lists. An empty list lets everything through.
///
/// Type entries match either a level (`red`, `roja`, ...) or a threat type.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    regions: Vec<String>,
    types: Vec<String>,
}

impl AlertFilter {
    pub fn new(regions: &[String], types: &[String]) -> Self {
        Self {
            regions: regions.iter().map(|r| fold(r)).filter(|r| !r.is_empty()).collect(),
            types: types.iter().map(|t| fold(t)).filter(|t| !t.is_empty()).collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.regions.is_empty() && self.types.is_empty()
    }

    pub fn passes(&self, event: &ChangeEvent) -> bool {
        self.passes_alert(&event.alert)
    }

    pub fn passes_alert(&self, alert: &Alert) -> bool {
        let region_ok = self.regions.is_empty() || self.regions.contains(&fold(&alert.region));
        if !region_ok {
            return false;
        }

        self.types.is_empty()
            || self.types.iter().any(|t| {
                AlertLevel::parse(t) == Some(alert.level) || *t == fold(&alert.threat_type)
            })
    }

    /// Keep the events that pass, preserving order.
    pub fn apply(&self, events: &[ChangeEvent]) -> Vec<ChangeEvent> {
        events.iter().filter(|e| self.passes(e)).cloned().collect()
    }
}
