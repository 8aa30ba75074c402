use rand::Rng;

/// Source of series fill colors.
///
/// The builder only asks for colors; whether they are random or fixed is up
/// to the implementation.
pub trait ColorSource {
    /// Next color as a CSS `rgba(...)` string.
    fn next_color(&mut self) -> String;
}

/// D3 category10, also the renderer's fallback for uncolored series.
pub const CATEGORY10: [(u8, u8, u8); 10] = [
    (31, 119, 180),
    (255, 127, 14),
    (44, 160, 44),
    (214, 39, 40),
    (148, 103, 189),
    (140, 86, 75),
    (227, 119, 194),
    (127, 127, 127),
    (188, 189, 34),
    (23, 190, 207),
];

fn rgba(r: u8, g: u8, b: u8) -> String {
    format!("rgba({}, {}, {}, 0.7)", r, g, b)
}

/// Fresh random channels on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomColors;

impl ColorSource for RandomColors {
    fn next_color(&mut self) -> String {
        let mut rng = rand::rng();
        rgba(rng.random(), rng.random(), rng.random())
    }
}

/// Cycles through a fixed list; deterministic.
#[derive(Debug, Clone)]
pub struct ColorPalette {
    colors: Vec<(u8, u8, u8)>,
    cursor: usize,
}

impl ColorPalette {
    pub fn new(colors: Vec<(u8, u8, u8)>) -> Self {
        Self { colors, cursor: 0 }
    }

    /// The D3 category10 palette.
    pub fn category10() -> Self {
        Self::new(CATEGORY10.to_vec())
    }
}

impl ColorSource for ColorPalette {
    fn next_color(&mut self) -> String {
        if self.colors.is_empty() {
            return rgba(0, 0, 0);
        }
        let (r, g, b) = self.colors[self.cursor % self.colors.len()];
        self.cursor += 1;
        rgba(r, g, b)
    }
}
