use crate::infra::{build_engine, parse_timestamp};
use chrono::{DateTime, FixedOffset};
use clap::Args;
use spot_traffic::config::AppConfig;
use spot_traffic::error::AppError;
use spot_traffic::traffic::{CongestionScore, Coordinates, CrowdRouter, RerouteDecision, SpotDirectory};

#[derive(Args, Debug, Default)]
pub(crate) struct SnapshotArgs {
    /// Evaluate at this RFC 3339 timestamp instead of now
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) at: Option<DateTime<FixedOffset>>,
    /// Only show spots in this region
    #[arg(long)]
    pub(crate) region: Option<String>,
    /// Print the table as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RerouteArgs {
    /// Destination spot, by name or id
    pub(crate) destination: String,
    /// Visitor latitude; distances are measured from here when given
    #[arg(long, requires = "lng", allow_negative_numbers = true)]
    pub(crate) lat: Option<f64>,
    /// Visitor longitude
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub(crate) lng: Option<f64>,
    /// Evaluate at this RFC 3339 timestamp instead of now
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) at: Option<DateTime<FixedOffset>>,
    /// Print the decision as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_snapshot(args: SnapshotArgs) -> Result<(), AppError> {
    let engine = build_engine(AppConfig::load()?.engine, args.at);
    let directory = engine.directory();

    let scores: Vec<CongestionScore> = engine
        .get_all_congestion()
        .into_iter()
        .filter(|score| match args.region.as_deref() {
            Some(region) => directory
                .spot_by_id(&score.spot_id)
                .map(|spot| spot.region.eq_ignore_ascii_case(region))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    if args.json {
        print_json(&scores);
        return Ok(());
    }

    println!("Congestion snapshot at {}", engine.now().to_rfc3339());
    if scores.is_empty() {
        println!("  No spots matched");
    }
    for score in &scores {
        let name = directory
            .spot_by_id(&score.spot_id)
            .map(|spot| spot.name)
            .unwrap_or_else(|| score.spot_id.to_string());
        let outlook = score
            .prediction
            .iter()
            .map(|prediction| format!("+{}h {}", prediction.hour_offset, prediction.predicted_score))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:<24} {:>3} {:<6} {:<7} [{}]",
            name,
            score.score,
            score.level,
            format!("{:?}", score.trend).to_ascii_lowercase(),
            outlook
        );
        if !score.unavailable_signals.is_empty() {
            let missing = score
                .unavailable_signals
                .iter()
                .map(|signal| signal.label())
                .collect::<Vec<_>>()
                .join(", ");
            println!("  {:<24} degraded, missing: {}", "", missing);
        }
    }

    let stats = engine.region_stats(args.region.as_deref());
    println!(
        "\n{} spots, average {:.1}, busiest {}",
        stats.total_spots,
        stats.average_score,
        stats
            .busiest_spot
            .as_ref()
            .map(|spot| spot.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(())
}

pub(crate) fn run_reroute(args: RerouteArgs) -> Result<(), AppError> {
    let engine = build_engine(AppConfig::load()?.engine, args.at);
    let router = CrowdRouter::new(engine);
    let origin = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
        _ => None,
    };

    let decision = router.check_reroute_from(&args.destination, origin)?;
    if args.json {
        print_json(&decision);
    } else {
        render_decision(&decision);
    }
    Ok(())
}

fn render_decision(decision: &RerouteDecision) {
    let score = &decision.destination_score;
    println!(
        "{}: {} ({})",
        decision.destination.name, score.level, score.score
    );
    if let Some(advisory) = decision.policy.advisory {
        println!("  {}", advisory);
    }

    if !decision.should_reroute {
        println!("  No reroute needed");
        return;
    }
    if decision.no_alternative_found() {
        println!("  Crowded, but no quieter alternative is open nearby");
        return;
    }

    println!("  Alternatives:");
    for (rank, alternative) in decision.alternatives.iter().enumerate() {
        println!(
            "  {}. {:<24} {:>3} {:<6} ~{} parking, {:+.2} km",
            rank + 1,
            alternative.suggested_spot.name,
            alternative.crowd_score,
            alternative.level,
            alternative.parking_available,
            alternative.distance_diff_km
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(err) => eprintln!("failed to render JSON: {}", err),
    }
}
