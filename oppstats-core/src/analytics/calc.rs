//! Rate and score calculators.
//!
//! Pure functions over raw counters. Every percentage is clamped into
//! `[0, 100]` and a zero denominator yields 0.

use crate::types::EngagementLevel;
use serde::Serialize;

/// Engagement score at or above which a day counts as high engagement.
pub const HIGH_ENGAGEMENT_SCORE: f64 = 100.0;
/// Engagement score at or above which a day counts as medium engagement.
pub const MEDIUM_ENGAGEMENT_SCORE: f64 = 30.0;

/// Points contributed by each session to the engagement score.
const SESSION_WEIGHT: f64 = 10.0;
/// Points contributed by each action to the engagement score.
const ACTION_WEIGHT: f64 = 1.0;

/// Weight of the view-to-click rate in the performance score.
const CLICK_RATE_WEIGHT: f64 = 0.4;
/// Weight of the click-to-participate rate in the performance score.
const PARTICIPATE_RATE_WEIGHT: f64 = 0.6;

/// The three funnel conversion rates, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConversionRates {
    pub view_to_click: f64,
    pub click_to_participate: f64,
    pub overall: f64,
}

/// `numerator / denominator × 100`, clamped into `[0, 100]`.
pub fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).clamp(0.0, 100.0)
}

/// Funnel rates for a view → click → participate sequence.
///
/// When nothing was viewed every rate is 0, whatever the other counters say.
pub fn conversion_rates(viewed: i64, clicked: i64, participated: i64) -> ConversionRates {
    if viewed <= 0 {
        return ConversionRates::default();
    }
    ConversionRates {
        view_to_click: percentage(clicked, viewed),
        click_to_participate: percentage(participated, clicked),
        overall: percentage(participated, viewed),
    }
}

/// Plain mean, 0 when `count` is 0.
pub fn average(total: i64, count: i64) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    total as f64 / count as f64
}

/// Fold one more sample into a mean.
///
/// `new_count` already includes the sample. The first sample becomes the mean.
pub fn running_average(old_average: f64, new_count: i64, sample: i64) -> f64 {
    if new_count <= 1 {
        return sample as f64;
    }
    let previous = (new_count - 1) as f64;
    (old_average * previous + sample as f64) / new_count as f64
}

/// Weighted activity score for one user-day.
pub fn engagement_score(sessions: i64, time_spent_secs: i64, actions: i64) -> f64 {
    sessions.max(0) as f64 * SESSION_WEIGHT
        + time_spent_secs.max(0) as f64 / 60.0
        + actions.max(0) as f64 * ACTION_WEIGHT
}

/// Classify a user-day into low/medium/high engagement.
pub fn engagement_level(sessions: i64, time_spent_secs: i64, actions: i64) -> EngagementLevel {
    let score = engagement_score(sessions, time_spent_secs, actions);
    if score >= HIGH_ENGAGEMENT_SCORE {
        EngagementLevel::High
    } else if score >= MEDIUM_ENGAGEMENT_SCORE {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Low
    }
}

/// Opportunity performance score in `[0, 100]`, computed from unique counters.
pub fn performance_score(unique_views: i64, unique_clicks: i64, unique_participations: i64) -> f64 {
    let rates = conversion_rates(unique_views, unique_clicks, unique_participations);
    (rates.view_to_click * CLICK_RATE_WEIGHT
        + rates.click_to_participate * PARTICIPATE_RATE_WEIGHT)
        .clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_conversion_rates_example() {
        let rates = conversion_rates(100, 50, 20);
        assert!(approx(rates.view_to_click, 50.0));
        assert!(approx(rates.click_to_participate, 40.0));
        assert!(approx(rates.overall, 20.0));
    }

    #[test]
    fn test_conversion_rates_zero_views() {
        assert_eq!(conversion_rates(0, 0, 0), ConversionRates::default());
        // Clicks without views still report nothing
        assert_eq!(conversion_rates(0, 7, 3), ConversionRates::default());
    }

    #[test]
    fn test_conversion_rates_totality() {
        for viewed in 1..=12 {
            for clicked in 0..=viewed {
                for participated in 0..=clicked {
                    let r = conversion_rates(viewed, clicked, participated);
                    for rate in [r.view_to_click, r.click_to_participate, r.overall] {
                        assert!((0.0..=100.0).contains(&rate));
                    }
                    if clicked > 0 {
                        let chained = r.view_to_click * r.click_to_participate / 100.0;
                        assert!(
                            (chained - r.overall).abs() < 1e-6,
                            "overall mismatch for ({viewed}, {clicked}, {participated})"
                        );
                    } else {
                        assert_eq!(r.click_to_participate, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rates_clamped_for_malformed_counters() {
        let r = conversion_rates(10, 40, 80);
        assert_eq!(r.view_to_click, 100.0);
        assert_eq!(r.click_to_participate, 100.0);
        assert_eq!(r.overall, 100.0);
    }

    #[test]
    fn test_engagement_level_examples() {
        assert_eq!(engagement_level(5, 1800, 50), EngagementLevel::High);
        assert_eq!(engagement_level(2, 600, 15), EngagementLevel::Medium);
        assert_eq!(engagement_level(1, 120, 3), EngagementLevel::Low);
        assert_eq!(engagement_level(0, 0, 0), EngagementLevel::Low);
    }

    #[test]
    fn test_engagement_level_monotonic() {
        let samples = [0, 1, 2, 5, 10, 30, 60, 120, 600, 1800, 6000];
        for &s in &samples {
            for &t in &samples {
                for &a in &samples {
                    let base = engagement_level(s, t, a);
                    assert!(engagement_level(s + 1, t, a) >= base);
                    assert!(engagement_level(s, t + 60, a) >= base);
                    assert!(engagement_level(s, t, a + 1) >= base);
                }
            }
        }
    }

    #[test]
    fn test_performance_score_example() {
        let score = performance_score(200, 100, 50);
        assert!(score >= 30.0);
        assert!(approx(score, 50.0));
    }

    #[test]
    fn test_performance_score_bounded() {
        let values = [0, 1, 3, 10, 100, 1000];
        for &v in &values {
            for &c in &values {
                for &p in &values {
                    let score = performance_score(v, c, p);
                    assert!((0.0..=100.0).contains(&score), "({v}, {c}, {p}) -> {score}");
                }
            }
        }
        assert_eq!(performance_score(1, 1000, 1000), 100.0);
    }

    #[test]
    fn test_running_average() {
        assert_eq!(running_average(0.0, 1, 100), 100.0);
        let avg = running_average(100.0, 2, 200);
        assert!(approx(avg, 150.0));
        let avg = running_average(avg, 3, 300);
        assert!(approx(avg, 200.0));
    }

    #[test]
    fn test_average_guards_zero_count() {
        assert_eq!(average(600, 0), 0.0);
        assert!(approx(average(600, 3), 200.0));
    }
}
