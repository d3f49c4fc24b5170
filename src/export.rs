use anyhow::{Context as _, Result};

use crate::workflows::campaign::CampaignResults;

const HEADER: [&str; 9] = [
    "Influencer ID",
    "Platform",
    "Fit Score",
    "Confidence",
    "Rationale",
    "Predicted Likes",
    "Predicted Comments",
    "Predicted Shares",
    "Predicted Views",
];

/// Default file name for a campaign's recommendation export.
pub fn csv_file_name(results: &CampaignResults) -> String {
    format!("bagana-campaign-{}.csv", results.campaign_id)
}

/// Render a campaign's ranked recommendations as CSV, every cell quoted.
pub fn recommendations_csv(results: &CampaignResults) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for rec in &results.recommendations {
        let e = &rec.predicted_engagement;
        writer.write_record([
            rec.influencer_id.clone(),
            rec.platform.to_string(),
            rec.fit_score.to_string(),
            rec.confidence.to_string(),
            rec.rationale.clone(),
            e.likes.to_string(),
            e.comments.to_string(),
            e.shares.to_string(),
            e.views.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}
