//! Text and JSON rendering of query results

use crate::OutputFormat;
use serde::Serialize;
use tracegraph_core::{
    BlastRadiusReport, Bottleneck, BottleneckKind, DependencyLink, DependencyReport, GraphEngine,
    Hop,
};

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn summary(engine: &GraphEngine, format: OutputFormat) -> anyhow::Result<()> {
    let topology = engine.service_mesh_topology();
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "graph_version": engine.snapshot().version(),
            "metrics": topology.metrics,
            "services": topology.services,
        }));
    }

    let m = &topology.metrics;
    println!("\n=== Service Mesh ===\n");
    println!("  Services:     {}", m.total_services);
    println!("  Connections:  {}", m.total_connections);
    println!("  Calls:        {}", m.total_calls);
    println!("  Errors:       {}", m.total_errors);

    if !topology.services.is_empty() {
        println!(
            "\n  {:<28} {:>8} {:>8} {:>10} {:>10} {:>6} {:>6}",
            "SERVICE", "CALLS", "ERR%", "AVG(ms)", "P95(ms)", "DEPS", "USERS"
        );
        for svc in &topology.services {
            println!(
                "  {:<28} {:>8} {:>7.2}% {:>10.1} {:>10.1} {:>6} {:>6}",
                svc.stats.name,
                svc.stats.call_count,
                svc.stats.error_rate,
                svc.stats.avg_latency,
                svc.stats.p95_latency,
                svc.dependency_count,
                svc.dependent_count,
            );
        }
    }
    println!();
    Ok(())
}

pub fn dependencies(report: &DependencyReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    let svc = &report.service;
    println!("\n=== {} ===\n", svc.name);
    if let Some(version) = &svc.version {
        println!("  Version:      {}", version);
    }
    if let Some(env) = &svc.environment {
        println!("  Environment:  {}", env);
    }
    println!(
        "  Calls:        {} ({:.2}% errors)",
        svc.call_count, svc.error_rate
    );
    println!(
        "  Latency:      avg {:.1}ms  p95 {:.1}ms  p99 {:.1}ms",
        svc.avg_latency, svc.p95_latency, svc.p99_latency
    );

    println!("\nCalls into:");
    print_links(&report.dependencies);
    println!("\nCalled by:");
    print_links(&report.dependents);
    println!();
    Ok(())
}

fn print_links(links: &[DependencyLink]) {
    if links.is_empty() {
        println!("  (none)");
        return;
    }
    for link in links {
        let ops: Vec<String> = link
            .top_operations
            .iter()
            .map(|op| format!("{} ({})", op.operation, op.count))
            .collect();
        println!(
            "  {:<28} {:>8} calls {:>7.2}% ok {:>9.1}ms  {}",
            link.service,
            link.call_count,
            link.success_rate,
            link.avg_latency,
            ops.join(", ")
        );
    }
}

pub fn path(from: &str, to: &str, hops: &[Hop], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(hops);
    }

    if hops.is_empty() {
        println!("No path from {} to {}", from, to);
        return Ok(());
    }
    println!("\n=== Critical path {} -> {} ===\n", from, to);
    for hop in hops {
        println!(
            "  {} -> {}  {} calls, {:.1}ms avg, {:.2}% ok",
            hop.from, hop.to, hop.call_count, hop.avg_latency, hop.success_rate
        );
    }
    println!();
    Ok(())
}

pub fn cycles(cycles: &[Vec<String>], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(cycles);
    }

    if cycles.is_empty() {
        println!("No circular dependencies");
        return Ok(());
    }
    println!("\n=== Circular dependencies ({}) ===\n", cycles.len());
    for cycle in cycles {
        // close the loop for display
        let mut names = cycle.clone();
        if let Some(first) = cycle.first() {
            names.push(first.clone());
        }
        println!("  {}", names.join(" -> "));
    }
    println!();
    Ok(())
}

pub fn bottlenecks(findings: &[Bottleneck], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(findings);
    }

    if findings.is_empty() {
        println!("No bottlenecks found");
        return Ok(());
    }
    println!("\n=== Bottlenecks ===\n");
    for finding in findings {
        let detail = match &finding.kind {
            BottleneckKind::HighLatency {
                avg_latency,
                threshold,
                call_count,
            } => format!(
                "high latency: {:.1}ms avg over {} calls (threshold {:.1}ms)",
                avg_latency, call_count, threshold
            ),
            BottleneckKind::HighErrorRate {
                error_rate,
                error_count,
                call_count,
            } => format!(
                "high error rate: {:.2}% ({} of {} calls)",
                error_rate, error_count, call_count
            ),
            BottleneckKind::HighFanIn {
                dependent_count,
                dependents,
            } => format!(
                "high fan-in: {} dependents ({})",
                dependent_count,
                dependents.join(", ")
            ),
        };
        match finding.impact_score {
            Some(score) => println!("  {:<28} {}  [impact {:.1}]", finding.service, detail, score),
            None => println!("  {:<28} {}", finding.service, detail),
        }
    }
    println!();
    Ok(())
}

pub fn blast_radius(report: &BlastRadiusReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    println!("\n=== Blast radius of {} ===\n", report.service);
    println!("  Affected services:  {}", report.affected_count);
    println!("  Calls affected:     {}", report.total_calls_affected);
    println!("  Score:              {}", report.blast_radius_score);
    if !report.affected_services.is_empty() {
        println!("\n  {}", report.affected_services.join(", "));
    }
    if !report.critical_services.is_empty() {
        println!("\n  Critical: {}", report.critical_services.join(", "));
    }
    println!();
    Ok(())
}

pub fn stale(services: &[String], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(services);
    }

    if services.is_empty() {
        println!("No stale services");
    }
    for name in services {
        println!("{}", name);
    }
    Ok(())
}

pub fn metrics(engine: &GraphEngine, format: OutputFormat) -> anyhow::Result<()> {
    let metrics = engine.metrics();
    match format {
        OutputFormat::Json => print_json(&metrics.to_json()),
        OutputFormat::Text => {
            print!("{}", metrics.to_prometheus());
            Ok(())
        }
    }
}
