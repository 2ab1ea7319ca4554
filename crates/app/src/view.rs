use spectrum_player_core::ViewConfig;

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Terminal stand-in for the bar view: one character row of columns.
#[derive(Debug, Clone)]
pub struct BarView {
    config: ViewConfig,
    columns: usize,
    ceiling: f32,
}

impl BarView {
    pub fn new(config: ViewConfig, columns: usize, ceiling: f32) -> Self {
        Self {
            config,
            columns: columns.max(1),
            ceiling: if ceiling > 0.0 { ceiling } else { 1.0 },
        }
    }

    /// Averages `magnitudes` into the configured number of columns.
    pub fn columns(&self, magnitudes: &[f32]) -> Vec<f32> {
        if magnitudes.is_empty() {
            return vec![0.0; self.columns];
        }

        (0..self.columns)
            .map(|column| {
                let start = column * magnitudes.len() / self.columns;
                let end = ((column + 1) * magnitudes.len() / self.columns).max(start + 1);
                let band = &magnitudes[start..end.min(magnitudes.len())];
                band.iter().sum::<f32>() / band.len() as f32
            })
            .collect()
    }

    pub fn render(&self, magnitudes: &[f32]) -> String {
        let margin = " ".repeat(self.config.column_margin as usize);
        let width = self.config.column_width.max(1) as usize;

        self.columns(magnitudes)
            .into_iter()
            .map(|value| {
                let level = (value / self.ceiling).clamp(0.0, 1.0);
                let glyph = if self.config.shows_blocks {
                    if level >= 0.5 {
                        '▆'
                    } else if level > 0.05 {
                        '▂'
                    } else {
                        ' '
                    }
                } else {
                    LEVELS[(level * (LEVELS.len() - 1) as f32).round() as usize]
                };
                glyph.to_string().repeat(width)
            })
            .collect::<Vec<_>>()
            .join(&margin)
    }
}
