//! @ai:module:intent Plain-text rendering of backend results
//! @ai:module:layer presentation
//! @ai:module:public_api render_analysis, render_topk, render_counts, render_confusion, render_points
//! @ai:module:stateless true

use crate::types::{AnalysisResponse, EmbeddingPoint, MetricsSummary, TopKItem};
use std::fmt::Write as FmtWrite;

const BAR_WIDTH: usize = 30;

/// @ai:intent Summary block for one analysis
/// @ai:effects pure
pub fn render_analysis(result: &AnalysisResponse) -> String {
    let mut output = String::new();

    writeln!(output, "Prediction: {}", result.id).unwrap();
    writeln!(output, "Model:      {}", result.model).unwrap();
    writeln!(
        output,
        "Embedding:  ({:.3}, {:.3})",
        result.embedding.x, result.embedding.y
    )
    .unwrap();
    writeln!(output).unwrap();
    output.push_str(&render_topk(&result.topk));

    if !result.neighbors.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "Nearest neighbors:").unwrap();
        for n in &result.neighbors {
            writeln!(output, "  {:<20} ({:.3}, {:.3})", n.label, n.x, n.y).unwrap();
        }
    }

    output
}

/// @ai:intent Ranked labels with a proportional bar
/// @ai:effects pure
pub fn render_topk(items: &[TopKItem]) -> String {
    let mut output = String::new();
    let width = label_width(items.iter().map(|i| i.label.as_str()));

    for item in items {
        let p = item.p.clamp(0.0, 1.0);
        let filled = (p * BAR_WIDTH as f64).round() as usize;
        writeln!(
            output,
            "{:<width$}  {:>5.1}%  {}",
            item.label,
            p * 100.0,
            "#".repeat(filled),
            width = width
        )
        .unwrap();
    }

    output
}

/// @ai:intent Prediction counts, most frequent first
/// @ai:effects pure
pub fn render_counts(summary: &MetricsSummary) -> String {
    let mut output = String::new();
    let mut counts: Vec<_> = summary.counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let width = label_width(counts.iter().map(|(label, _)| label.as_str()));
    for (label, n) in counts {
        writeln!(output, "{:<width$}  {}", label, n, width = width).unwrap();
    }

    output
}

/// @ai:intent Confusion grid: rows are true labels, columns predicted labels
/// @ai:pre summary.validate() is Ok
/// @ai:effects pure
pub fn render_confusion(summary: &MetricsSummary) -> String {
    let mut output = String::new();
    let row_header = label_width(summary.classes.iter().map(String::as_str)).max("true\\pred".len());

    let cell = summary
        .classes
        .iter()
        .map(|c| c.chars().count())
        .chain(
            summary
                .confusion
                .iter()
                .flatten()
                .map(|v| v.to_string().len()),
        )
        .max()
        .unwrap_or(1);

    write!(output, "{:<width$}", "true\\pred", width = row_header).unwrap();
    for class in &summary.classes {
        write!(output, "  {:>cell$}", class, cell = cell).unwrap();
    }
    writeln!(output).unwrap();

    for (class, row) in summary.classes.iter().zip(&summary.confusion) {
        write!(output, "{:<width$}", class, width = row_header).unwrap();
        for value in row {
            write!(output, "  {:>cell$}", value, cell = cell).unwrap();
        }
        writeln!(output).unwrap();
    }

    output
}

/// @ai:intent Table of embedding points
/// @ai:effects pure
pub fn render_points(points: &[EmbeddingPoint]) -> String {
    let mut output = String::new();
    let id_width = points.iter().map(|p| p.id.len()).max().unwrap_or(2).max(2);
    let label_w = label_width(points.iter().map(|p| p.label.as_str())).max("label".len());

    writeln!(
        output,
        "{:<id$}  {:<lw$}  {:>9}  {:>9}",
        "id",
        "label",
        "x",
        "y",
        id = id_width,
        lw = label_w
    )
    .unwrap();
    for p in points {
        writeln!(
            output,
            "{:<id$}  {:<lw$}  {:>9.3}  {:>9.3}",
            p.id,
            p.label,
            p.x,
            p.y,
            id = id_width,
            lw = label_w
        )
        .unwrap();
    }

    output
}

fn label_width<'a>(labels: impl Iterator<Item = &'a str>) -> usize {
    labels.map(|l| l.chars().count()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn summary() -> MetricsSummary {
        MetricsSummary {
            counts: BTreeMap::from([("cat".to_string(), 3), ("dog".to_string(), 1)]),
            confusion: vec![vec![3, 0], vec![1, 0]],
            classes: vec!["cat".to_string(), "dog".to_string()],
        }
    }

    #[test]
    fn test_topk_bars_scale_with_probability() {
        let out = render_topk(&[
            TopKItem {
                label: "tabby".to_string(),
                p: 0.5,
            },
            TopKItem {
                label: "cat".to_string(),
                p: 0.1,
            },
        ]);
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines[0], format!("tabby   50.0%  {}", "#".repeat(15)));
        assert_eq!(lines[1], format!("cat     10.0%  {}", "#".repeat(3)));
    }

    #[test]
    fn test_counts_sorted_descending() {
        assert_eq!(render_counts(&summary()), "cat  3\ndog  1\n");
    }

    #[test]
    fn test_confusion_grid_layout() {
        let expected = "\
true\\pred  cat  dog
cat          3    0
dog          1    0
";
        assert_eq!(render_confusion(&summary()), expected);
    }

    #[test]
    fn test_points_table_has_header() {
        let out = render_points(&[EmbeddingPoint {
            id: "p1".to_string(),
            x: 1.0,
            y: -2.5,
            label: "cat".to_string(),
            thumb: None,
        }]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id  label"));
        assert!(lines[1].contains("-2.500"));
    }
}
