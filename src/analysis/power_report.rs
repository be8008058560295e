//! Energy-per-inference report from a persisted power log.
//!
//! Reads `power_log_<stamp>.csv` → attributes readings to inferences → prints
//! mean power, deviation, duration, energy and efficiency → optionally writes the
//! per-inference summary CSV and a two-panel HTML chart.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use plotly::{
    Bar, Plot, Scatter,
    common::Mode,
    layout::{Axis, GridPattern, Layout, LayoutGrid},
};

use turbine_edge::persistence::write_csv;
use turbine_edge::power::{
    IDLE_POWER_W,
    analysis::{PowerReport, analyze, read_power_log},
};

#[derive(Debug, Parser)]
#[command(name = "analyze_power", about = "Energy per inference from a power log")]
struct Args {
    /// Power log CSV (timestamp, power, tag).
    input: PathBuf,

    /// Idle draw subtracted from every reading, in watts.
    #[arg(long, default_value_t = IDLE_POWER_W)]
    offset: f64,

    /// Write the per-inference summary here.
    #[arg(long)]
    summary_csv: Option<PathBuf>,

    /// Write an HTML chart here.
    #[arg(long)]
    html: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let readings = read_power_log(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let report = analyze(&readings, args.offset);

    print_report(&report);

    if let Some(path) = &args.summary_csv {
        let rows = write_csv(path, &report.per_inference)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Per-inference summary ({} rows) saved to {}", rows, path.display());
    }

    if let Some(path) = &args.html {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        build_chart(&report).write_html(path);
        println!("Chart saved to {}", path.display());
    }

    Ok(())
}

fn print_report(report: &PowerReport) {
    println!("Inferences analysed       : {}", report.per_inference.len());
    println!("Overall Mean Power/Inf    : {:.4} Watts", report.overall_mean_power);
    println!("MEAD                      : {:.4} Watts", report.mead);
    println!("Standard Deviation        : {:.4} Watts", report.stdev);
    println!("Mean Inference Duration   : {:.4} s", report.mean_duration_s);
    println!("Mean Energy/Inf           : {:.4} Joules", report.mean_energy_j);
    println!("Performance               : {} Inf/s", report.performance);
    println!("Efficiency                : {:.4} Inf/s/W", report.efficiency);
}

fn build_chart(report: &PowerReport) -> Plot {
    let ids: Vec<u64> = report.per_inference.iter().map(|s| s.inference_id).collect();
    let means: Vec<f64> = ids
        .iter()
        .map(|id| report.mean_power.get(id).copied().unwrap_or(0.0))
        .collect();
    let durations: Vec<f64> = report.per_inference.iter().map(|s| s.duration).collect();

    let mut plot = Plot::new();

    plot.add_trace(
        Bar::new(ids.clone(), means)
            .name("Mean power above idle (W)")
            .x_axis("x")
            .y_axis("y"),
    );

    plot.add_trace(
        Scatter::new(ids, durations)
            .name("Duration (s)")
            .mode(Mode::Markers)
            .x_axis("x2")
            .y_axis("y2"),
    );

    let layout = Layout::new()
        .title("Power per Inference")
        .height(900)
        .width(1400)
        .show_legend(true)
        .grid(
            LayoutGrid::new()
                .rows(2)
                .columns(1)
                .pattern(GridPattern::Independent),
        )
        .x_axis(Axis::new().title("Inference"))
        .y_axis(Axis::new().title("Watts").domain(&[0.55, 1.0]))
        .x_axis2(Axis::new().title("Inference"))
        .y_axis2(Axis::new().title("Seconds").domain(&[0.0, 0.45]));

    plot.set_layout(layout);
    plot
}
