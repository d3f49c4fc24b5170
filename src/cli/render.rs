use crate::workflows::campaign::CampaignResults;
use crate::workflows::research::ResearchResults;
use crate::workflows::{Campaign, Research, WorkflowKind};

/// Terminal rendering for a workflow variant.
pub(crate) trait Report: WorkflowKind {
    fn print_results(results: &Self::Results);
    fn print_history_table(entries: &[Self::Results]);
}

/// Progress line for a stage, with its description when the variant knows it.
pub(crate) fn stage_line<W: WorkflowKind>(stage: &str) -> String {
    match W::STAGES.iter().position(|s| s.name == stage) {
        Some(i) => format!(
            "[{}/{}] {}: {}",
            i + 1,
            W::STAGES.len(),
            stage,
            W::STAGES[i].message
        ),
        None => stage.to_string(),
    }
}

fn seconds(ms: u64) -> String {
    format!("{}s", ms / 1000)
}

fn print_list(title: &str, items: &[String]) {
    println!("\n{}:", title);
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {}", i + 1, item);
    }
}

impl Report for Research {
    fn print_results(r: &ResearchResults) {
        println!("\nQuery: {}", r.query);
        println!(
            "Completed: {} ({})",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            seconds(r.duration)
        );
        println!("\nSummary:\n  {}", r.summary);
        print_list("Findings", &r.findings);
        print_list("Recommendations", &r.recommendations);
        print_list("Sources", &r.sources);
    }

    fn print_history_table(entries: &[ResearchResults]) {
        println!("{:<34} {:<20} {:<8} QUERY", "RUN ID", "COMPLETED", "SOURCES");
        println!("{}", "-".repeat(92));
        for r in entries {
            println!(
                "{:<34} {:<20} {:<8} {}",
                r.run_id,
                r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                r.sources.len(),
                r.query
            );
        }
    }
}

impl Report for Campaign {
    fn print_results(r: &CampaignResults) {
        println!("\nCampaign: {}", r.campaign_id);
        println!(
            "Completed: {} ({})",
            r.completed_at.format("%Y-%m-%d %H:%M:%S"),
            seconds(r.duration)
        );

        println!("\nRecommendations:");
        println!(
            "  {:<4} {:<16} {:<10} {:<10} {:<10} {:>10}",
            "#", "INFLUENCER", "PLATFORM", "FIT", "CONF", "VIEWS"
        );
        for (i, rec) in r.recommendations.iter().enumerate() {
            println!(
                "  {:<4} {:<16} {:<10} {:<10} {:<10} {:>10}",
                i + 1,
                rec.influencer_id,
                rec.platform,
                format!("{} ({})", rec.fit_score, rec.fit_band()),
                rec.confidence_label(),
                rec.predicted_engagement.views
            );
            println!("       {}", rec.rationale);
            if let Some(ref s) = rec.content_strategy {
                println!("       strategy: {} / {} / {}", s.format, s.messaging, s.timing);
            }
        }

        let f = &r.performance_forecast;
        let e = &f.predicted_engagement;
        println!("\nForecast:");
        println!(
            "  engagement: {} likes, {} comments, {} shares, {} views",
            e.likes, e.comments, e.shares, e.views
        );
        if let Some(ref c) = f.predicted_conversion {
            println!(
                "  conversion: {} clicks, {} leads, {} sales",
                c.clicks, c.leads, c.sales
            );
        }
        if let Some(roi) = f.predicted_roi {
            println!("  ROI: {:.1}x", roi);
        }
        if let Some(ref ci) = f.confidence_intervals {
            println!("  ROI range: p10 {:.1}x, p50 {:.1}x, p90 {:.1}x", ci.p10, ci.p50, ci.p90);
        }
        if !f.risk_indicators.is_empty() {
            println!("  risks:");
            for risk in &f.risk_indicators {
                println!("    - {}", risk);
            }
        }
    }

    fn print_history_table(entries: &[CampaignResults]) {
        println!("{:<40} {:<20} {:<6} TOP FIT", "CAMPAIGN ID", "COMPLETED", "RECS");
        println!("{}", "-".repeat(80));
        for r in entries {
            let top = r
                .recommendations
                .first()
                .map(|rec| format!("{} ({})", rec.fit_score, rec.influencer_id))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<40} {:<20} {:<6} {}",
                r.campaign_id,
                r.completed_at.format("%Y-%m-%d %H:%M:%S"),
                r.recommendations.len(),
                top
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_line_numbers_known_stages() {
        assert_eq!(
            stage_line::<Campaign>("Audience Agent"),
            "[2/4] Audience Agent: Modeling audience..."
        );
        assert_eq!(stage_line::<Research>("Other"), "Other");
    }
}
