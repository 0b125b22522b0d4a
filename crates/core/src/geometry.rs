use rand::Rng;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Width/height pair, used for desktops, images and windows alike
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

impl Size {
    pub fn new(w: f64, h: f64) -> Self {
        Size { w, h }
    }
}

/// Axis-aligned rectangle given by two corners. Corners may arrive in
/// any order from the annotation tool; `normalized` sorts them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Rect { p0: Point::new(x1, y1), p1: Point::new(x2, y2) }
    }

    pub fn from_points(p0: Point, p1: Point) -> Self {
        Rect { p0, p1 }
    }

    pub fn normalized(&self) -> Rect {
        Rect::new(
            self.p0.x.min(self.p1.x),
            self.p0.y.min(self.p1.y),
            self.p0.x.max(self.p1.x),
            self.p0.y.max(self.p1.y),
        )
    }

    pub fn width(&self) -> f64 {
        (self.p1.x - self.p0.x).abs()
    }

    pub fn height(&self) -> f64 {
        (self.p1.y - self.p0.y).abs()
    }

    pub fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2.0, (self.p0.y + self.p1.y) / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        let r = self.normalized();
        p.x >= r.p0.x && p.x <= r.p1.x && p.y >= r.p0.y && p.y <= r.p1.y
    }

    pub fn corners(&self) -> [Point; 2] {
        [self.p0, self.p1]
    }

    /// Grow or shrink about the centre by `scale`, clamped to `[0,1]`.
    /// Only meaningful for percentage rectangles.
    pub fn scaled_unit(&self, scale: f64) -> Rect {
        let c = self.center();
        let w = self.width() * scale;
        let h = self.height() * scale;
        Rect::new(
            (c.x - w / 2.0).max(0.0),
            (c.y - h / 2.0).max(0.0),
            (c.x + w / 2.0).min(1.0),
            (c.y + h / 2.0).min(1.0),
        )
    }
}

/// Non-interactive chrome thickness around a window's content area
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BorderInset {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BorderInset {
    /// Derive the inset from a rectangle drawn around the content area of a
    /// reference image of `image` size.
    pub fn from_calibration(rect: Rect, image: Size) -> Self {
        BorderInset {
            left: rect.p0.x,
            top: rect.p0.y,
            right: image.w - rect.p1.x,
            bottom: image.h - rect.p1.y,
        }
    }
}

/// Pick a click point inside `rect`, Gaussian around the centre with
/// sigma = 10% of each side. Falls back to clamping after 100 draws.
pub fn sample_point(rect: Rect) -> Point {
    sample_point_with(rect, 0.1, &mut rand::thread_rng())
}

pub fn sample_point_with<R: Rng>(rect: Rect, sigma_ratio: f64, rng: &mut R) -> Point {
    let r = rect.normalized();
    let c = r.center();
    let sx = r.width() * sigma_ratio;
    let sy = r.height() * sigma_ratio;

    let mut last = c;
    for _ in 0..100 {
        let (nx, ny) = standard_normal_pair(rng);
        last = Point::new(c.x + nx * sx, c.y + ny * sy);
        if r.contains(last) {
            return last;
        }
    }
    Point::new(last.x.clamp(r.p0.x, r.p1.x), last.y.clamp(r.p0.y, r.p1.y))
}

// Box-Muller
fn standard_normal_pair<R: Rng>(rng: &mut R) -> (f64, f64) {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let mag = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f64::consts::PI * u2;
    (mag * theta.cos(), mag * theta.sin())
}
