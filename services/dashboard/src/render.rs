//! 2x2 SVG dashboard: turnout lines, winner-share heatmap, unemployment
//! lines, latest poverty bars.

use crate::data::{
    department_order, indicator_series, latest_values, turnout_series, winner_shares,
    TurnoutPoint, WinnerShare, POVERTY, UNEMPLOYMENT,
};
use anyhow::{anyhow, bail, Result};
use etl::{ElectionResultRow, IndicatorValueRow};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const SIZE: (u32, u32) = (1800, 1100);
const TITLE: &str = "Elections presidentielles IDF (decoupage departemental)";
const BAR_COLOR: RGBColor = RGBColor(0x2A, 0x6F, 0x97);
// Heatmap ramp, low to high.
const HEAT_LOW: RGBColor = RGBColor(255, 255, 204);
const HEAT_HIGH: RGBColor = RGBColor(37, 52, 148);

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Draw the dashboard to `output` from loaded results and indicator values.
pub fn render(
    output: &Path,
    results: &[ElectionResultRow],
    values: &[IndicatorValueRow],
) -> Result<()> {
    if results.is_empty() {
        bail!("no election data available to build the dashboard");
    }
    if values.is_empty() {
        bail!("no socio-economic data available to build the dashboard");
    }

    let turnout = turnout_series(results);
    let winners = winner_shares(results);
    let dept_order = department_order(&turnout);

    let root = SVGBackend::new(output, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let root = root
        .titled(TITLE, ("sans-serif", 28))
        .map_err(draw_err)?;

    let panels = root.split_evenly((2, 2));
    draw_turnout(&panels[0], &turnout, &dept_order)?;
    draw_winner_heatmap(&panels[1], &winners, &dept_order)?;
    draw_unemployment(&panels[2], values, &dept_order)?;
    draw_latest_poverty(&panels[3], values, &dept_order)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

fn draw_err<E: std::fmt::Debug>(err: E) -> anyhow::Error {
    anyhow!("failed to draw dashboard: {err:?}")
}

/// Year axis covering every point, padded by one year each side.
fn year_range(years: impl IntoIterator<Item = i32>) -> std::ops::Range<i32> {
    let years: BTreeSet<i32> = years.into_iter().collect();
    match (years.first(), years.last()) {
        (Some(first), Some(last)) => first - 1..last + 2,
        _ => 0..1,
    }
}

/// `0..max` with some headroom; never empty.
fn value_range(values: impl IntoIterator<Item = f64>) -> std::ops::Range<f64> {
    let max = values.into_iter().fold(0.0_f64, f64::max);
    if max > 0.0 {
        0.0..max * 1.15
    } else {
        0.0..1.0
    }
}

fn segment_label(value: &SegmentValue<i32>, labels: &[String]) -> String {
    match value {
        SegmentValue::CenterOf(idx) => usize::try_from(*idx)
            .ok()
            .and_then(|i| labels.get(i))
            .cloned()
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Linear blend between the heatmap endpoints, `t` in [0, 1].
fn heat_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    RGBColor(
        mix(HEAT_LOW.0, HEAT_HIGH.0),
        mix(HEAT_LOW.1, HEAT_HIGH.1),
        mix(HEAT_LOW.2, HEAT_HIGH.2),
    )
}

fn draw_turnout(area: &Area, turnout: &[TurnoutPoint], dept_order: &[String]) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .caption("Participation au 1er tour presidentiel", ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(year_range(turnout.iter().map(|p| p.year)), 0f64..100f64)
        .map_err(draw_err)?;
    chart
        .configure_mesh()
        .x_desc("Annee")
        .y_desc("%")
        .x_label_formatter(&|year| year.to_string())
        .draw()
        .map_err(draw_err)?;

    for (idx, code) in dept_order.iter().enumerate() {
        let points: Vec<&TurnoutPoint> = turnout.iter().filter(|p| &p.dept_code == code).collect();
        let Some(first) = points.first() else {
            continue;
        };
        let color = Palette99::pick(idx).to_rgba();
        let label = format!("{} - {}", code, first.dept_name);
        chart
            .draw_series(LineSeries::new(
                points.iter().map(|p| (p.year, p.turnout_pct)),
                color.stroke_width(2),
            ))
            .map_err(draw_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart
            .draw_series(points.iter().map(|p| Circle::new((p.year, p.turnout_pct), 3, color.filled())))
            .map_err(draw_err)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(draw_err)?;
    Ok(())
}

fn draw_winner_heatmap(area: &Area, winners: &[WinnerShare], dept_order: &[String]) -> Result<()> {
    let years: Vec<i32> = winners
        .iter()
        .map(|w| w.year)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let year_labels: Vec<String> = years.iter().map(i32::to_string).collect();
    let cells: BTreeMap<(i32, &str), f64> = winners
        .iter()
        .map(|w| ((w.year, w.dept_code.as_str()), w.share_pct))
        .collect();

    let (low, high) = cells
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let spread = if high > low { high - low } else { 1.0 };

    let mut chart = ChartBuilder::on(area)
        .caption("Score du candidat arrive 1er (%)", ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            (0..years.len() as i32).into_segmented(),
            (0..dept_order.len() as i32).into_segmented(),
        )
        .map_err(draw_err)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Annee")
        .y_desc("Departement")
        .x_labels(years.len().max(1))
        .y_labels(dept_order.len().max(1))
        .x_label_formatter(&|v| segment_label(v, &year_labels))
        .y_label_formatter(&|v| segment_label(v, dept_order))
        .draw()
        .map_err(draw_err)?;

    let mut rects = Vec::new();
    for (x, year) in years.iter().enumerate() {
        for (y, dept) in dept_order.iter().enumerate() {
            let Some(share) = cells.get(&(*year, dept.as_str())) else {
                continue;
            };
            let (x, y) = (x as i32, y as i32);
            rects.push(Rectangle::new(
                [
                    (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
                ],
                heat_color((share - low) / spread).filled(),
            ));
        }
    }
    chart.draw_series(rects).map_err(draw_err)?;
    Ok(())
}

fn draw_unemployment(area: &Area, values: &[IndicatorValueRow], dept_order: &[String]) -> Result<()> {
    let series = indicator_series(values, UNEMPLOYMENT);
    let mut chart = ChartBuilder::on(area)
        .caption("Chomage (%) par departement", ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            year_range(series.values().flatten().map(|(year, _)| *year)),
            value_range(series.values().flatten().map(|(_, value)| *value)),
        )
        .map_err(draw_err)?;
    chart
        .configure_mesh()
        .x_desc("Annee")
        .y_desc("Chomage (%)")
        .x_label_formatter(&|year| year.to_string())
        .draw()
        .map_err(draw_err)?;

    for (idx, code) in dept_order.iter().enumerate() {
        let Some(points) = series.get(code) else {
            continue;
        };
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(draw_err)?
            .label(code.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart
            .draw_series(points.iter().map(|p| Circle::new(*p, 3, color.filled())))
            .map_err(draw_err)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(draw_err)?;
    Ok(())
}

fn draw_latest_poverty(area: &Area, values: &[IndicatorValueRow], dept_order: &[String]) -> Result<()> {
    let Some((year, bars)) = latest_values(values, POVERTY, dept_order) else {
        area.titled("Pauvrete (%) - donnees indisponibles", ("sans-serif", 22))
            .map_err(draw_err)?;
        return Ok(());
    };
    let labels: Vec<String> = bars.iter().map(|(dept, _)| dept.clone()).collect();

    let mut chart = ChartBuilder::on(area)
        .caption(format!("Pauvrete (%) par departement - {year}"), ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            (0..labels.len() as i32).into_segmented(),
            value_range(bars.iter().map(|(_, value)| *value)),
        )
        .map_err(draw_err)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Departement")
        .y_desc("%")
        .x_labels(labels.len().max(1))
        .x_label_formatter(&|v| segment_label(v, &labels))
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(bars.iter().enumerate().map(|(idx, (_, value))| {
            let x = idx as i32;
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(x), 0.0), (SegmentValue::Exact(x + 1), *value)],
                BAR_COLOR.filled(),
            );
            bar.set_margin(0, 0, 8, 8);
            bar
        }))
        .map_err(draw_err)?;
    Ok(())
}
