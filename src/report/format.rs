//! Formatted terminal output.

use crate::domain::Quantile;
use crate::report::PointSummary;

/// Aligned table of the best record per point.
///
/// Cross-section columns are added when any row carries a cross section.
pub fn format_summary(rows: &[PointSummary]) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("No limits recorded.\n");
        return out;
    }

    let with_xsec = rows.iter().any(|r| r.xsec_limits.is_some());

    let mut header = format!("{:<28} {:<18}", "point", "method");
    let mut rule = format!("{:-<28} {:-<18}", "", "");
    for q in Quantile::ALL {
        header.push_str(&format!(" {:>10}", q.key()));
        rule.push_str(&format!(" {:-<10}", ""));
    }
    if with_xsec {
        header.push_str(&format!(" {:>12} {:>12} {:>12}", "xsec", "xs_obs", "xs_med"));
        rule.push_str(&format!(" {:-<12} {:-<12} {:-<12}", "", "", ""));
    }
    out.push_str(header.trim_end());
    out.push('\n');
    out.push_str(rule.trim_end());
    out.push('\n');

    for r in rows {
        let mut line = format!("{:<28} {:<18}", truncate(&r.point, 28), r.method.name());
        for q in Quantile::ALL {
            line.push_str(&format!(" {:>10}", fmt_limit(r.limits.get(&q).copied())));
        }
        if with_xsec {
            let scaled = |q: Quantile| r.xsec_limits.as_ref().and_then(|m| m.get(&q).copied());
            line.push_str(&format!(
                " {:>12} {:>12} {:>12}",
                fmt_limit(r.xsec),
                fmt_limit(scaled(Quantile::Obs)),
                fmt_limit(scaled(Quantile::Med)),
            ));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

fn fmt_limit(v: Option<f64>) -> String {
    match v {
        Some(v) if v.abs() >= 1e4 || (v != 0.0 && v.abs() < 1e-3) => format!("{v:.3e}"),
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
