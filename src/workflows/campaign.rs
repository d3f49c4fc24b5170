use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::types::RunHandle;

use super::{Depth, Scope, Stage, ValidationErrors, WorkflowKind, check_text, labelled_enum};

/// Campaign planning workflow: a brief answered with ranked influencer
/// recommendations and a performance forecast.
#[derive(Debug, Clone, Copy, Default)]
pub struct Campaign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Instagram, Platform::Tiktok];

    pub fn label(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kpi {
    Engagement,
    Conversions,
    Roi,
    Reach,
    BrandAwareness,
}

impl Kpi {
    pub const ALL: [Kpi; 5] = [
        Kpi::Engagement,
        Kpi::Conversions,
        Kpi::Roi,
        Kpi::Reach,
        Kpi::BrandAwareness,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kpi::Engagement => "engagement",
            Kpi::Conversions => "conversions",
            Kpi::Roi => "roi",
            Kpi::Reach => "reach",
            Kpi::BrandAwareness => "brand_awareness",
        }
    }
}

labelled_enum!(Platform, "platform");
labelled_enum!(Kpi, "KPI");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBrief {
    pub objectives: String,
    pub target_audience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    pub kpis: Vec<Kpi>,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub depth: Depth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMetrics {
    pub clicks: u64,
    pub leads: u64,
    pub sales: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

impl ConfidenceIntervals {
    pub fn is_ordered(&self) -> bool {
        self.p10 <= self.p50 && self.p50 <= self.p90
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStrategy {
    pub format: String,
    pub messaging: String,
    pub timing: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub influencer_id: String,
    pub platform: Platform,
    /// Suitability for the campaign, 0–100.
    pub fit_score: u8,
    /// 0.0–1.0.
    pub confidence: f64,
    pub rationale: String,
    pub predicted_engagement: EngagementMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_strategy: Option<ContentStrategy>,
}

impl Recommendation {
    pub fn is_in_range(&self) -> bool {
        self.fit_score <= 100 && (0.0..=1.0).contains(&self.confidence)
    }

    pub fn fit_band(&self) -> &'static str {
        if self.fit_score >= 80 {
            "strong"
        } else if self.fit_score >= 60 {
            "good"
        } else {
            "weak"
        }
    }

    pub fn confidence_label(&self) -> &'static str {
        if self.confidence >= 0.8 {
            "High"
        } else if self.confidence >= 0.6 {
            "Medium"
        } else {
            "Low"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceForecast {
    pub predicted_engagement: EngagementMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_conversion: Option<ConversionMetrics>,
    /// Return multiplier ("x").
    #[serde(default, rename = "predictedROI", skip_serializing_if = "Option::is_none")]
    pub predicted_roi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_intervals: Option<ConfidenceIntervals>,
    #[serde(default)]
    pub risk_indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResults {
    pub campaign_id: RunHandle,
    pub recommendations: Vec<Recommendation>,
    pub performance_forecast: PerformanceForecast,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub completed_at: DateTime<Utc>,
    /// Milliseconds between creation and completion.
    pub duration: u64,
}

impl CampaignResults {
    pub fn is_ranked(&self) -> bool {
        self.recommendations
            .windows(2)
            .all(|w| w[0].fit_score >= w[1].fit_score)
    }
}

impl WorkflowKind for Campaign {
    type Input = CampaignBrief;
    type Results = CampaignResults;

    const NAME: &'static str = "campaign";
    const HISTORY_KEY: &'static str = "bagana_campaign_history";
    const HISTORY_CAPACITY: usize = 20;
    const FAILURE_MESSAGE: &'static str = "Campaign planning workflow failed";
    const SUBMIT_FAILURE_MESSAGE: &'static str = "Failed to start campaign planning";
    const HANDLE_PREFIX: &'static str = "campaign";
    const HANDLE_FIELD: &'static str = "campaignId";
    const SUBMIT_PATH: &'static str = "/api/v1/campaigns/plan";
    const STATUS_PATH: &'static str = "/api/v1/campaigns/{id}/status";
    const STAGES: &'static [Stage] = &[
        Stage {
            name: "Trend Agent",
            message: "Analyzing trends...",
        },
        Stage {
            name: "Audience Agent",
            message: "Modeling audience...",
        },
        Stage {
            name: "Influencer Agent",
            message: "Scoring influencers...",
        },
        Stage {
            name: "Performance Agent",
            message: "Forecasting performance...",
        },
    ];

    fn validate(brief: &CampaignBrief) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_text(&mut errors, "objectives", "Objectives", &brief.objectives, 20, 1000);
        check_text(
            &mut errors,
            "targetAudience",
            "Target audience",
            &brief.target_audience,
            10,
            500,
        );
        if let Some(budget) = brief.budget
            && (budget.is_nan() || budget <= 0.0)
        {
            errors.push("budget", "Budget must be a positive number");
        }
        if brief.kpis.is_empty() {
            errors.push("kpis", "At least one KPI must be selected");
        }
        if brief.platforms.is_empty() {
            errors.push("platforms", "At least one platform must be selected");
        }
        errors.into_result()
    }

    /// Reject out-of-range scores and forecasts, then rank recommendations by
    /// fit score, highest first. Ties keep backend order.
    fn normalize(results: &mut CampaignResults) -> Result<(), String> {
        if let Some(rec) = results.recommendations.iter().find(|r| !r.is_in_range()) {
            return Err(format!(
                "Run returned out-of-range recommendation {}: fit score {}, confidence {}",
                rec.influencer_id, rec.fit_score, rec.confidence
            ));
        }
        let forecast = &results.performance_forecast;
        if forecast.predicted_roi.is_some_and(|roi| roi.is_nan() || roi < 0.0) {
            return Err("Run returned a negative predicted ROI".to_string());
        }
        if forecast.confidence_intervals.is_some_and(|ci| !ci.is_ordered()) {
            return Err("Run returned unordered ROI confidence intervals".to_string());
        }

        results
            .recommendations
            .sort_by(|a, b| b.fit_score.cmp(&a.fit_score));
        Ok(())
    }

    fn run_handle(results: &CampaignResults) -> &RunHandle {
        &results.campaign_id
    }
}

fn recommendation(
    id: &str,
    platform: Platform,
    fit_score: u8,
    confidence: f64,
    rationale: &str,
    (likes, comments, shares, views): (u64, u64, u64, u64),
    strategy: Option<(&str, &str, &str)>,
) -> Recommendation {
    Recommendation {
        influencer_id: id.to_string(),
        platform,
        fit_score,
        confidence,
        rationale: rationale.to_string(),
        predicted_engagement: EngagementMetrics {
            likes,
            comments,
            shares,
            views,
        },
        content_strategy: strategy.map(|(format, messaging, timing)| ContentStrategy {
            format: format.to_string(),
            messaging: messaging.to_string(),
            timing: timing.to_string(),
        }),
    }
}

/// Canned results for a campaign run. Only the brief's platforms are
/// recommended; with none selected every platform is eligible.
pub fn sample_results(
    campaign_id: &RunHandle,
    brief: &CampaignBrief,
    created_at: DateTime<Utc>,
    duration_ms: u64,
) -> CampaignResults {
    let candidates = vec![
        recommendation(
            "influencer_1",
            Platform::Instagram,
            85,
            0.9,
            "Strong audience overlap (78%), high engagement rate (4.2%), proven track record in similar campaigns",
            (5000, 250, 120, 25000),
            Some(("carousel", "product showcase", "peak hours")),
        ),
        recommendation(
            "influencer_2",
            Platform::Tiktok,
            82,
            0.85,
            "Excellent audience alignment (75%), viral content potential, strong engagement in target demographic",
            (15000, 800, 500, 100000),
            Some(("short-form video", "trending challenge", "evening hours")),
        ),
        recommendation(
            "influencer_3",
            Platform::Instagram,
            78,
            0.8,
            "Good audience fit (72%), consistent performance, authentic content style",
            (3500, 180, 90, 18000),
            Some(("reels", "behind-the-scenes", "lunch hours")),
        ),
        recommendation(
            "influencer_4",
            Platform::Tiktok,
            75,
            0.75,
            "Moderate audience overlap (68%), growing following, strong engagement trends",
            (12000, 600, 350, 80000),
            Some(("short-form video", "user-generated content", "afternoon hours")),
        ),
        recommendation(
            "influencer_5",
            Platform::Instagram,
            72,
            0.7,
            "Decent audience match (65%), reliable performance, good brand alignment",
            (2800, 140, 70, 15000),
            None,
        ),
    ];

    let recommendations: Vec<Recommendation> = candidates
        .into_iter()
        .filter(|r| brief.platforms.is_empty() || brief.platforms.contains(&r.platform))
        .collect();

    let predicted_engagement = recommendations.iter().fold(
        EngagementMetrics::default(),
        |acc, r| EngagementMetrics {
            likes: acc.likes + r.predicted_engagement.likes,
            comments: acc.comments + r.predicted_engagement.comments,
            shares: acc.shares + r.predicted_engagement.shares,
            views: acc.views + r.predicted_engagement.views,
        },
    );

    CampaignResults {
        campaign_id: campaign_id.clone(),
        recommendations,
        performance_forecast: PerformanceForecast {
            predicted_engagement,
            predicted_conversion: Some(ConversionMetrics {
                clicks: 5000,
                leads: 250,
                sales: 50,
            }),
            predicted_roi: Some(3.2),
            confidence_intervals: Some(ConfidenceIntervals {
                p10: 2.1,
                p50: 3.2,
                p90: 4.5,
            }),
            risk_indicators: vec![
                "Moderate audience overlap".to_string(),
                "Seasonal trends may impact performance".to_string(),
            ],
        },
        created_at,
        completed_at: created_at + Duration::milliseconds(duration_ms as i64),
        duration: duration_ms,
    }
}
