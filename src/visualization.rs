//! # Visualization
//!
//! $$
//! \{(\sigma_k, \mu_k, \mathbf w_k)\}_k \mapsto \text{frontier, allocation and return charts}
//! $$
//!
//! Plotly figures for a pipeline run, written as standalone HTML.

use std::path::Path;

use ndarray::Array2;
use plotly::common::Anchor;
use plotly::common::Font;
use plotly::common::Line;
use plotly::common::Marker;
use plotly::common::Mode;
use plotly::layout::Annotation;
use plotly::layout::Axis;
use plotly::layout::GridPattern;
use plotly::layout::LayoutGrid;
use plotly::layout::Margin;
use plotly::Bar;
use plotly::HeatMap;
use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;

use crate::error::Result;
use crate::market::Ticker;
use crate::portfolio::Frontier;
use crate::portfolio::Portfolio;
use crate::portfolio::SelectedPortfolios;
use crate::returns::ReturnMatrix;

struct GridEntry {
  title: String,
  x: Vec<String>,
  values: Vec<f64>,
}

/// Small-multiples line chart, one subplot per series.
pub struct GridPlotter {
  entries: Vec<GridEntry>,
  cols: usize,
  title: String,
  x_gap: f64,
  y_gap: f64,
}

impl Default for GridPlotter {
  fn default() -> Self {
    Self::new()
  }
}

impl GridPlotter {
  pub fn new() -> Self {
    Self {
      entries: Vec::new(),
      cols: 2,
      title: String::new(),
      x_gap: 0.06,
      y_gap: 0.12,
    }
  }

  pub fn title(mut self, title: &str) -> Self {
    self.title = title.into();
    self
  }

  pub fn cols(mut self, n: usize) -> Self {
    self.cols = n.max(1);
    self
  }

  pub fn register(mut self, title: &str, x: Vec<String>, values: Vec<f64>) -> Self {
    self.entries.push(GridEntry {
      title: title.into(),
      x,
      values,
    });
    self
  }

  /// One subplot per column of `returns`.
  pub fn register_columns(mut self, returns: &ReturnMatrix) -> Self {
    let x = date_labels(returns);
    for (j, ticker) in returns.tickers.iter().enumerate() {
      self = self.register(ticker.as_str(), x.clone(), returns.column(j).to_vec());
    }
    self
  }

  pub fn plot(self) -> Plot {
    let n = self.entries.len();
    let cols = self.cols.min(n.max(1));
    let rows = n.div_ceil(cols).max(1);
    let plot_height = rows * 320 + 160;
    let x_gap = if cols > 1 { self.x_gap / cols as f64 } else { 0.0 };
    let y_gap = if rows > 1 { self.y_gap / rows as f64 } else { 0.0 };

    let axis_name = |subplot_idx: usize, axis: &str| -> String {
      if subplot_idx == 1 {
        axis.to_string()
      } else {
        format!("{axis}{subplot_idx}")
      }
    };

    let annotations = self
      .entries
      .iter()
      .enumerate()
      .map(|(idx, entry)| {
        let subplot_idx = idx + 1;
        Annotation::new()
          .text(format!("<b>{}</b>", entry.title))
          .x_ref(format!("{} domain", axis_name(subplot_idx, "x")))
          .y_ref(format!("{} domain", axis_name(subplot_idx, "y")))
          .x(0.5)
          .y(1.0)
          .x_anchor(Anchor::Center)
          .y_anchor(Anchor::Bottom)
          .font(Font::new().size(12))
          .show_arrow(false)
      })
      .collect::<Vec<_>>();

    let mut plot = Plot::new();
    plot.set_layout(
      Layout::new()
        .title(self.title.as_str())
        .auto_size(true)
        .height(plot_height)
        .show_legend(false)
        .margin(Margin::new().left(56).right(24).top(84).bottom(44))
        .annotations(annotations)
        .grid(
          LayoutGrid::new()
            .rows(rows)
            .columns(cols)
            .x_gap(x_gap)
            .y_gap(y_gap)
            .pattern(GridPattern::Independent),
        ),
    );

    for (idx, entry) in self.entries.into_iter().enumerate() {
      let subplot_idx = idx + 1;
      let trace = Scatter::new(entry.x, entry.values)
        .mode(Mode::Lines)
        .line(Line::new().width(1.0))
        .name(entry.title.as_str())
        .x_axis(axis_name(subplot_idx, "x").as_str())
        .y_axis(axis_name(subplot_idx, "y").as_str());
      plot.add_trace(trace);
    }

    plot
  }
}

/// Columns of a near-square grid for `n` subplots.
pub fn grid_cols(n: usize) -> usize {
  ((n as f64).sqrt().ceil() as usize).max(1)
}

fn date_labels(returns: &ReturnMatrix) -> Vec<String> {
  returns.dates.iter().map(|d| d.to_string()).collect()
}

fn labelled_layout(title: &str, x: &str, y: &str) -> Layout {
  Layout::new()
    .title(title)
    .x_axis(Axis::new().title(x))
    .y_axis(Axis::new().title(y))
}

/// Risk/return curve with the named portfolios marked.
pub fn frontier_chart(frontier: &Frontier, portfolios: Option<&SelectedPortfolios>) -> Plot {
  let risk: Vec<f64> = frontier.points.iter().map(|p| p.risk).collect();
  let ret: Vec<f64> = frontier.points.iter().map(|p| p.expected_return).collect();

  let mut plot = Plot::new();
  plot.add_trace(
    Scatter::new(risk, ret)
      .mode(Mode::LinesMarkers)
      .name("Efficient frontier"),
  );
  if let Some(selected) = portfolios {
    for p in selected.iter() {
      plot.add_trace(
        Scatter::new(vec![p.point.risk], vec![p.point.expected_return])
          .mode(Mode::Markers)
          .marker(Marker::new().size(12))
          .name(p.kind.to_string().as_str()),
      );
    }
  }
  plot.set_layout(labelled_layout(
    "Efficient Frontier",
    "Risk (standard deviation)",
    "Expected return",
  ));
  plot
}

/// Weight of every ticker along the frontier.
pub fn allocation_spaghetti(frontier: &Frontier, tickers: &[Ticker]) -> Plot {
  let risk: Vec<f64> = frontier.points.iter().map(|p| p.risk).collect();
  let mut plot = Plot::new();
  for (j, ticker) in tickers.iter().enumerate() {
    let weights: Vec<f64> = frontier
      .points
      .iter()
      .map(|p| p.weights.get(j).copied().unwrap_or(0.0))
      .collect();
    plot.add_trace(
      Scatter::new(risk.clone(), weights)
        .mode(Mode::Lines)
        .name(ticker.as_str()),
    );
  }
  plot.set_layout(labelled_layout(
    "Allocation Along the Frontier",
    "Risk (standard deviation)",
    "Weight",
  ));
  plot
}

/// Bar chart of one portfolio's weights.
pub fn allocation_bar(portfolio: &Portfolio) -> Plot {
  let (names, weights): (Vec<String>, Vec<f64>) = portfolio
    .allocations()
    .map(|(t, w)| (t.to_string(), w))
    .unzip();
  let mut plot = Plot::new();
  plot.add_trace(Bar::new(names, weights).name(portfolio.kind.to_string().as_str()));
  plot.set_layout(labelled_layout(
    &format!(
      "{} Portfolio (risk {:.4}, return {:.4})",
      portfolio.kind, portfolio.point.risk, portfolio.point.expected_return
    ),
    "Ticker",
    "Weight",
  ));
  plot
}

/// Ticker-by-ticker matrix heatmap.
pub fn matrix_heatmap(matrix: &Array2<f64>, tickers: &[Ticker], title: &str) -> Plot {
  let names: Vec<String> = tickers.iter().map(|t| t.to_string()).collect();
  let z: Vec<Vec<f64>> = matrix.rows().into_iter().map(|r| r.to_vec()).collect();
  let mut plot = Plot::new();
  plot.add_trace(HeatMap::new(names.clone(), names, z));
  plot.set_layout(Layout::new().title(title));
  plot
}

/// One line per column of `returns` on a shared date axis.
pub fn return_lines(returns: &ReturnMatrix, title: &str, y_label: &str) -> Plot {
  let x = date_labels(returns);
  let mut plot = Plot::new();
  for (j, ticker) in returns.tickers.iter().enumerate() {
    plot.add_trace(
      Scatter::new(x.clone(), returns.column(j).to_vec())
        .mode(Mode::Lines)
        .name(ticker.as_str()),
    );
  }
  plot.set_layout(labelled_layout(title, "Date", y_label));
  plot
}

/// Render `plot` as a standalone HTML file.
pub fn write_plot(plot: &Plot, path: &Path) -> Result<()> {
  std::fs::write(path, plot.to_html())?;
  Ok(())
}
