use colored::*;

use crate::classify::QUOTA_MESSAGE;
use crate::models::{
    AdaptedPost, AutoFilledDetails, DailyTrend, ProviderSearchResult, Relevance, SearchResultItem,
    TestDetailsItem, TestRecommendationResult,
};
use crate::notifications::{Notification, Severity};
use crate::state::{GeneratedPost, RequestState};

/// Console rendering for the command-line driver.
pub struct Visual;

impl Visual {
    /// Toasts go to stderr so results on stdout stay pipeable
    pub fn notification(notification: &Notification) {
        let line = match notification.severity {
            Severity::Info => format!("ℹ {}", notification.message).cyan(),
            Severity::Success => format!("✔ {}", notification.message).green(),
            Severity::Error => format!("✖ {}", notification.message).red(),
        };
        eprintln!("   {line}");
    }

    pub fn quota_banner() {
        eprintln!(
            "{} {}",
            "⚠".bright_yellow(),
            QUOTA_MESSAGE.bright_yellow().bold()
        );
    }

    pub fn reply(text: &str) {
        println!("{} {}", "assistant>".bright_cyan().bold(), text);
    }

    pub fn trends(trends: &[DailyTrend]) {
        for (i, trend) in trends.iter().enumerate() {
            println!("{}. {}", (i + 1).to_string().cyan(), trend.title.bold());
            println!("   {}", trend.summary);
        }
    }

    pub fn providers(providers: &[ProviderSearchResult]) {
        if providers.is_empty() {
            println!("{}", "No providers found.".yellow());
            return;
        }
        for provider in providers {
            println!("{} ({})", provider.name.bold(), provider.kind.to_string().dimmed());
            println!("   {}", provider.address);
            println!("   {} · {}", provider.phone, provider.website.underline());
        }
    }

    pub fn search_results(results: &[SearchResultItem]) {
        if results.is_empty() {
            println!("{}", "No matching pages.".yellow());
            return;
        }
        for item in results {
            println!(
                "{} {} [{:?}]",
                format!("{:.2}", item.relevance_score).cyan(),
                item.title.bold(),
                item.target_page
            );
            println!("   {}", item.description);
        }
    }

    pub fn recommendation(rec: &TestRecommendationResult) {
        println!("{}", rec.primary_assessment.bold());
        println!("{}", rec.assessment_description);
        for issue in &rec.potential_issues {
            let tag = match issue.relevance {
                Relevance::High => "High".red(),
                Relevance::Medium => "Medium".yellow(),
                Relevance::Low => "Low".green(),
            };
            println!("   [{}] {}: {}", tag, issue.name.bold(), issue.description);
        }
        println!("{}", "Recommended tests:".bright_cyan());
        for test in &rec.recommended_tests {
            println!("   • {test}");
        }
        println!("{}", "Management advice:".bright_cyan());
        for advice in &rec.management_advice {
            println!("   • {advice}");
        }
        println!("{}", rec.next_steps_and_expert_consultation);
        println!("{}", rec.disclaimer.dimmed());
    }

    pub fn test_details(details: &[TestDetailsItem]) {
        for item in details {
            println!("{}", item.test_name.bold());
            println!("   Purpose: {}", item.purpose);
            println!("   Method: {}", item.methodology);
            println!("   Turnaround: {} · Cost: {}", item.turnaround_time, item.estimated_cost);
        }
    }

    pub fn auto_fill(details: &AutoFilledDetails) {
        let show = |label: &str, value: &str| {
            let value = if value.is_empty() { "-" } else { value };
            println!("   {}: {}", label.cyan(), value);
        };
        show("Specific conditions", &details.specific_conditions);
        show("Control sample", &details.control_sample_info);
        show("Sample age", &details.sample_age);
    }

    pub fn post(post: &GeneratedPost) {
        println!("{} {}", "Platform:".bright_cyan(), post.platform);
        println!("{}", post.text);
        match &post.image {
            RequestState::Succeeded(bytes) => {
                println!("{}", format!("[image: {} bytes]", bytes.len()).dimmed())
            }
            RequestState::Failed(reason) => {
                println!("{}", format!("[image failed: {reason}]").red())
            }
            RequestState::Pending => println!("{}", "[image pending]".dimmed()),
            RequestState::Idle => {}
        }
    }

    pub fn adapted(post: &AdaptedPost) {
        println!("{}", post.title.bold());
        println!("{}", post.content);
    }
}
