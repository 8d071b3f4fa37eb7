//! Terminal output formatting for the cacrs CLI.

use chrono::{DateTime, Utc};
use console::{Style, Term, style};

use cacrs_core::ai::WebSearchResult;
use cacrs_core::dashboard::DashboardSummary;
use cacrs_core::models::{
    Case, CaseEvent, CaseEventKind, CaseFile, CaseStatus, Finding, GroundingSource, Message,
    MessageRole, Watchlist,
};
use cacrs_core::services::{ServiceConfig, ServiceStatus, ServiceTestResult};
use cacrs_core::tour::{TourState, TourStep};

/// Terminal width for formatting, with fallback.
fn term_width() -> usize {
    Term::stdout().size().1 as usize
}

/// Format a relative time string (e.g., "2 days ago", "just now").
fn relative_time(dt: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(dt);

    if duration.num_seconds() < 60 {
        return "just now".to_string();
    }
    if duration.num_minutes() < 60 {
        let mins = duration.num_minutes();
        return format!("{mins} min{s} ago", s = if mins == 1 { "" } else { "s" });
    }
    if duration.num_hours() < 24 {
        let hours = duration.num_hours();
        return format!("{hours} hour{s} ago", s = if hours == 1 { "" } else { "s" });
    }
    if duration.num_days() < 7 {
        let days = duration.num_days();
        return format!("{days} day{s} ago", s = if days == 1 { "" } else { "s" });
    }

    dt.format("%Y-%m-%d").to_string()
}

fn status_style(status: CaseStatus) -> Style {
    match status {
        CaseStatus::Open => Style::new().green().bold(),
        CaseStatus::InProgress => Style::new().yellow().bold(),
        CaseStatus::Closed => Style::new().dim(),
    }
}

fn role_style(message: &Message) -> Style {
    if message.is_report {
        return Style::new().magenta().bold();
    }
    match message.role {
        MessageRole::User => Style::new().cyan().bold(),
        MessageRole::Assistant => Style::new().green().bold(),
    }
}

fn service_status_style(status: ServiceStatus) -> Style {
    match status {
        ServiceStatus::Ok => Style::new().green(),
        ServiceStatus::Error => Style::new().red().bold(),
        ServiceStatus::Disabled | ServiceStatus::Untested => Style::new().dim(),
    }
}

/// Wrap text to the terminal, indenting continuation lines.
fn wrap_text(s: &str, prefix_width: usize) -> String {
    let width = term_width().saturating_sub(prefix_width + 2).max(40);
    textwrap::wrap(s, width)
        .into_iter()
        .map(|cow| cow.to_string())
        .collect::<Vec<_>>()
        .join(&format!("\n{:prefix_width$}", ""))
}

fn separator() -> String {
    "─".repeat(term_width().min(100))
}

pub fn print_cases(cases: &[Case]) {
    if cases.is_empty() {
        println!("{}", style("No cases.").dim());
        return;
    }
    for case in cases {
        let label = status_style(case.status).apply_to(case.status.label());
        let tags = if case.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", case.tags.join(", "))
        };
        println!(
            "{} {} {}{}",
            style(&case.id).dim(),
            label,
            style(&case.title).bold(),
            style(tags).cyan()
        );
    }
}

fn describe_event(kind: &CaseEventKind) -> String {
    match kind {
        CaseEventKind::Message { author, text } => format!("{author}: {text}"),
        CaseEventKind::FileAdded { file_name } => format!("file added: {file_name}"),
        CaseEventKind::StatusChange { old, new } => {
            format!("status: {} -> {}", old.label(), new.label())
        }
        CaseEventKind::AiAnalysis { file_name, summary } => {
            format!("analysis of {file_name}: {summary}")
        }
    }
}

pub fn print_case_detail(case: &Case, files: &[CaseFile], events: &[CaseEvent]) {
    println!("{}", style(&case.title).bold());
    println!(
        "{} | {} | opened by {} {}",
        status_style(case.status).apply_to(case.status.label()),
        if case.category.is_empty() { "-" } else { &case.category },
        case.created_by,
        style(relative_time(case.created_at)).dim().italic()
    );
    if !case.description.is_empty() {
        println!();
        println!("{}", wrap_text(&case.description, 0));
    }

    if !files.is_empty() {
        println!();
        println!("{}", style("Files").underlined());
        for file in files {
            let analysed = if file.analysis.is_some() { " (analysed)" } else { "" };
            println!(
                "  {} {} {} bytes{}",
                style(&file.id).dim(),
                file.name,
                file.size,
                style(analysed).green()
            );
        }
    }

    if !events.is_empty() {
        println!();
        println!("{}", style("Timeline").underlined());
        for event in events {
            println!(
                "  {} {}",
                style(event.created_at.format("%Y-%m-%d %H:%M")).dim(),
                wrap_text(&describe_event(&event.kind), 19)
            );
        }
    }
}

pub fn print_messages(messages: &[Message]) {
    for message in messages {
        let label = if message.is_report {
            "report".to_string()
        } else {
            message.role.to_string()
        };
        println!(
            "{} {} {}",
            role_style(message).apply_to(label),
            style(&message.id).dim(),
            style(relative_time(message.timestamp)).dim().italic()
        );
        println!("{}", message.content);
        if let Some(sources) = &message.sources {
            print_sources(sources);
        }
        println!();
    }
}

fn print_sources(sources: &[GroundingSource]) {
    for (i, source) in sources.iter().enumerate() {
        println!(
            "  {} {} {}",
            style(format!("[{}]", i + 1)).dim(),
            source.title,
            style(&source.uri).cyan().underlined()
        );
    }
}

pub fn print_search_result(query: &str, result: &WebSearchResult) {
    println!("{}", style(format!("Search: {query}")).bold());
    println!("{}", style(separator()).dim());
    println!("{}", wrap_text(&result.text, 0));
    if !result.sources.is_empty() {
        println!();
        print_sources(&result.sources);
    }
}

pub fn print_findings(findings: &[Finding]) {
    if findings.is_empty() {
        println!("{}", style("No saved findings.").dim());
        return;
    }
    let sep = separator();
    for (i, finding) in findings.iter().enumerate() {
        if i > 0 {
            println!("{}", style(&sep).dim());
        }
        println!(
            "{} {} {}",
            style(&finding.id).dim(),
            style(&finding.query).bold(),
            style(relative_time(finding.saved_at)).dim().italic()
        );
        println!("   {}", wrap_text(&finding.text, 3));
        print_sources(&finding.sources);
    }
}

pub fn print_watchlists(watchlists: &[Watchlist]) {
    if watchlists.is_empty() {
        println!("{}", style("No watchlists.").dim());
        return;
    }
    for watchlist in watchlists {
        println!(
            "{} {} every {} min, last run {}",
            style(&watchlist.id).dim(),
            style(&watchlist.name).bold(),
            watchlist.refresh_interval_minutes,
            relative_time(watchlist.last_run)
        );
        println!("   {}", style(&watchlist.query).italic());
    }
}

pub fn print_services(services: &[ServiceConfig]) {
    for service in services {
        let enabled = if service.enabled {
            style("on ").green()
        } else {
            style("off").dim()
        };
        let status = service_status_style(service.last_check_status)
            .apply_to(format!("{:?}", service.last_check_status).to_lowercase());
        println!(
            "{enabled} {:<18} {:<28} {}",
            service.service_id, service.display_name, status
        );
    }
}

pub fn print_service_test(service_id: &str, result: &ServiceTestResult) {
    let status = service_status_style(result.status)
        .apply_to(format!("{:?}", result.status).to_lowercase());
    let code = result
        .error_code
        .as_deref()
        .map(|code| format!(" ({code})"))
        .unwrap_or_default();
    println!("{service_id}: {status}{code} {}", result.message);
}

pub fn print_dashboard(summary: &DashboardSummary) {
    println!("{}", style("Dashboard").bold());
    println!("{}", style(separator()).dim());
    println!("Cases:    {}", summary.total_cases);
    for count in &summary.by_status {
        println!(
            "  {:<10} {}",
            status_style(count.status).apply_to(count.label),
            count.count
        );
    }
    println!("Findings: {}", summary.findings);
    if !summary.cases_per_month.is_empty() {
        println!();
        for month in &summary.cases_per_month {
            println!("  {} {}", month.month, "█".repeat(month.count));
        }
    }
    if !summary.alerts.is_empty() {
        println!();
        println!("{}", style("Alerts").underlined());
        for alert in &summary.alerts {
            println!(
                "  {:<6} {} {}",
                style(alert.severity.as_str()).red(),
                alert.title,
                style(relative_time(alert.timestamp)).dim()
            );
        }
    }
}

pub fn print_tour(state: TourState, steps: &[TourStep]) {
    let current = match state {
        TourState::Active { step } => Some(step),
        TourState::Inactive | TourState::Completed => None,
    };
    let label = match state {
        TourState::Completed => "completed",
        TourState::Active { .. } => "in progress",
        TourState::Inactive => "inactive",
    };
    println!("{} {}", style("Onboarding tour:").bold(), label);
    for (i, step) in steps.iter().enumerate() {
        let marker = if current == Some(i) { ">" } else { " " };
        println!(
            "{marker} {}. {} {}",
            i + 1,
            style(&step.title).bold(),
            style(format!("#{}", step.anchor)).dim()
        );
        println!("     {}", wrap_text(&step.content, 5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_time_just_now() {
        assert_eq!(relative_time(Utc::now()), "just now");
    }

    #[test]
    fn relative_time_falls_back_to_date() {
        let old = Utc::now() - chrono::Duration::days(30);
        assert_eq!(relative_time(old), old.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn status_change_reads_with_labels() {
        let kind = CaseEventKind::StatusChange {
            old: CaseStatus::Open,
            new: CaseStatus::Closed,
        };
        assert_eq!(describe_event(&kind), "status: Ouvert -> Fermé");
    }
}
