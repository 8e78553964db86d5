//! Gas Alarm Automation
//!
//! Classifies gas readings into a severity and maps the severity to a buzzer
//! action. Everything here is a pure function of its inputs; the engine keeps
//! no state between readings.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default upper bound (inclusive) of the normal range, in ppm
pub const DEFAULT_WARNING_PPM: i64 = 200;

/// Default upper bound (inclusive) of the warning range, in ppm
pub const DEFAULT_DANGER_PPM: i64 = 500;

/// Severity of a gas reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buzzer action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmAction {
    On,
    Off,
}

impl AlarmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmAction::On => "on",
            AlarmAction::Off => "off",
        }
    }
}

impl fmt::Display for AlarmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid automation settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Gas thresholds must be non-negative (warning={warning}, danger={danger})")]
    NegativeThreshold { warning: i64, danger: i64 },

    #[error("Warning threshold {warning} must be below danger threshold {danger}")]
    UnorderedThresholds { warning: i64, danger: i64 },
}

/// Gas thresholds `T1 < T2`
///
/// `ppm <= T1` is normal, `T1 < ppm <= T2` is warning, `ppm > T2` is danger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    warning_above: i64,
    danger_above: i64,
}

impl Thresholds {
    pub fn new(warning_above: i64, danger_above: i64) -> Result<Self, AutomationError> {
        if warning_above < 0 || danger_above < 0 {
            return Err(AutomationError::NegativeThreshold {
                warning: warning_above,
                danger: danger_above,
            });
        }
        if warning_above >= danger_above {
            return Err(AutomationError::UnorderedThresholds {
                warning: warning_above,
                danger: danger_above,
            });
        }
        Ok(Self {
            warning_above,
            danger_above,
        })
    }

    /// T1
    pub fn warning_above(&self) -> i64 {
        self.warning_above
    }

    /// T2
    pub fn danger_above(&self) -> i64 {
        self.danger_above
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_above: DEFAULT_WARNING_PPM,
            danger_above: DEFAULT_DANGER_PPM,
        }
    }
}

/// Classify a gas reading
pub fn classify(ppm: i64, thresholds: &Thresholds) -> Severity {
    if ppm > thresholds.danger_above {
        Severity::Danger
    } else if ppm > thresholds.warning_above {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

/// Map a severity to a buzzer action
pub fn decide_alarm(severity: Severity) -> AlarmAction {
    match severity {
        Severity::Normal => AlarmAction::Off,
        Severity::Warning | Severity::Danger => AlarmAction::On,
    }
}

/// Whether automatic decisions are actually sent to the buzzer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmPolicy {
    /// Publish `off` when a reading returns to normal
    pub auto_off: bool,
}

impl Default for AlarmPolicy {
    fn default() -> Self {
        Self { auto_off: true }
    }
}

/// Outcome of evaluating one gas reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmDecision {
    pub severity: Severity,
    pub action: AlarmAction,
    /// False when the policy suppresses this action
    pub publish: bool,
}

/// Thresholds plus publish policy
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomationEngine {
    thresholds: Thresholds,
    policy: AlarmPolicy,
}

impl AutomationEngine {
    pub fn new(thresholds: Thresholds, policy: AlarmPolicy) -> Self {
        Self { thresholds, policy }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn classify(&self, ppm: i64) -> Severity {
        classify(ppm, &self.thresholds)
    }

    /// Classify a reading and decide the buzzer action
    pub fn evaluate(&self, ppm: i64) -> AlarmDecision {
        let severity = self.classify(ppm);
        let action = decide_alarm(severity);
        let publish = match action {
            AlarmAction::On => true,
            AlarmAction::Off => self.policy.auto_off,
        };
        AlarmDecision {
            severity,
            action,
            publish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::new(200, 500).unwrap()
    }

    #[test]
    fn test_classify_boundaries() {
        let t = thresholds();
        assert_eq!(classify(0, &t), Severity::Normal);
        assert_eq!(classify(200, &t), Severity::Normal);
        assert_eq!(classify(201, &t), Severity::Warning);
        assert_eq!(classify(500, &t), Severity::Warning);
        assert_eq!(classify(501, &t), Severity::Danger);
        assert_eq!(classify(-10, &t), Severity::Normal);
    }

    #[test]
    fn test_classify_is_monotonic() {
        let t = thresholds();
        let mut previous = classify(-1000, &t);
        for ppm in -1000..=2000 {
            let current = classify(ppm, &t);
            assert!(current >= previous, "severity dropped at {} ppm", ppm);
            previous = current;
        }
    }

    #[test]
    fn test_alarm_on_iff_above_warning_threshold() {
        let t = thresholds();
        for ppm in -100..=1500 {
            let on = decide_alarm(classify(ppm, &t)) == AlarmAction::On;
            assert_eq!(on, ppm > t.warning_above(), "mismatch at {} ppm", ppm);
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let engine = AutomationEngine::new(thresholds(), AlarmPolicy::default());
        for ppm in [0, 199, 350, 650, 10_000] {
            assert_eq!(engine.evaluate(ppm), engine.evaluate(ppm));
        }
    }

    #[test]
    fn test_normal_reading_publishes_off() {
        let engine = AutomationEngine::new(thresholds(), AlarmPolicy::default());
        let decision = engine.evaluate(50);
        assert_eq!(decision.severity, Severity::Normal);
        assert_eq!(decision.action, AlarmAction::Off);
        assert!(decision.publish);
    }

    #[test]
    fn test_danger_reading_publishes_on() {
        let engine = AutomationEngine::new(thresholds(), AlarmPolicy::default());
        let decision = engine.evaluate(650);
        assert_eq!(decision.severity, Severity::Danger);
        assert_eq!(decision.action, AlarmAction::On);
        assert!(decision.publish);
    }

    #[test]
    fn test_auto_off_disabled_suppresses_off_only() {
        let engine = AutomationEngine::new(thresholds(), AlarmPolicy { auto_off: false });
        assert!(!engine.evaluate(50).publish);
        assert!(engine.evaluate(300).publish);
    }

    #[test]
    fn test_threshold_validation() {
        assert_eq!(
            Thresholds::new(500, 200),
            Err(AutomationError::UnorderedThresholds {
                warning: 500,
                danger: 200
            })
        );
        assert!(Thresholds::new(300, 300).is_err());
        assert!(Thresholds::new(-1, 300).is_err());
        assert!(Thresholds::new(500, 1000).is_ok());
    }

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.warning_above(), DEFAULT_WARNING_PPM);
        assert_eq!(t.danger_above(), DEFAULT_DANGER_PPM);
    }
}
