//! Chart.js chart types accepted by QuickChart.

use chartsync_shared::{ChartSyncError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    HorizontalBar,
    Line,
    Pie,
    Doughnut,
    Radar,
    PolarArea,
    Scatter,
    Bubble,
}

impl ChartKind {
    pub const ALL: [ChartKind; 9] = [
        Self::Bar,
        Self::HorizontalBar,
        Self::Line,
        Self::Pie,
        Self::Doughnut,
        Self::Radar,
        Self::PolarArea,
        Self::Scatter,
        Self::Bubble,
    ];

    /// Name used in the Chart.js `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::HorizontalBar => "horizontalBar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Doughnut => "doughnut",
            Self::Radar => "radar",
            Self::PolarArea => "polarArea",
            Self::Scatter => "scatter",
            Self::Bubble => "bubble",
        }
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChartKind {
    type Err = ChartSyncError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                ChartSyncError::render(
                    "chart type",
                    format!("unknown chart type '{wanted}': expected one of {}", known.join(", ")),
                )
            })
    }
}
