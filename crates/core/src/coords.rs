//! Coordinate frames and the converter between them.
//!
//! Four frames are supported:
//!
//! * screen-pixel: absolute desktop pixels, the canonical pivot
//! * screen-percentage: fraction of the desktop size
//! * window-pixel: pixels from the window's outer top-left, border included
//! * window-content-percentage: fraction of the content rectangle, border excluded
//!
//! A [`Converter`] is built for one query. It derives every frame reachable
//! from the input and the [`Reference`], then is read and dropped.

use std::path::Path;

use crate::error::CoordError;
use crate::geometry::{BorderInset, Point, Rect, Size};
use crate::types::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    ScreenPixel,
    ScreenPercentage,
    WindowPixel,
    WindowContentPercentage,
}

impl Frame {
    pub const ALL: [Frame; 4] = [
        Frame::ScreenPixel,
        Frame::ScreenPercentage,
        Frame::WindowPixel,
        Frame::WindowContentPercentage,
    ];

    pub fn is_percentage(self) -> bool {
        matches!(self, Frame::ScreenPercentage | Frame::WindowContentPercentage)
    }

    pub fn name(self) -> &'static str {
        match self {
            Frame::ScreenPixel => "screen-pixel",
            Frame::ScreenPercentage => "screen-percentage",
            Frame::WindowPixel => "window-pixel",
            Frame::WindowContentPercentage => "window-content-percentage",
        }
    }
}

/// Live window position plus its border inset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowGeometry {
    pub region: Region,
    pub border: BorderInset,
}

impl WindowGeometry {
    pub fn new(region: Region, border: BorderInset) -> Self {
        WindowGeometry { region, border }
    }

    fn origin(&self) -> Point {
        Point::new(self.region.l as f64, self.region.t as f64)
    }

    fn size(&self) -> Size {
        Size::new(self.region.w as f64, self.region.h as f64)
    }
}

/// What a window-relative coordinate is relative to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A live window on the desktop.
    Window(WindowGeometry),
    /// A reference screenshot of known size, optionally with a border
    /// calibration measured on an image of the same kind.
    Image { size: Size, calibration: Option<BorderInset> },
    /// An in-memory pixel buffer: plain scaling, no border.
    RawPixels(Size),
}

impl Reference {
    pub fn image_file(path: &Path, calibration: Option<BorderInset>) -> Result<Self, CoordError> {
        let (w, h) = image::image_dimensions(path).map_err(|e| CoordError::ImageUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Reference::Image { size: Size::new(w as f64, h as f64), calibration })
    }
}

/// All frames derivable for one set of points, computed once.
#[derive(Debug, Clone)]
pub struct Converter {
    screen_pixel: Option<Vec<Point>>,
    screen_percentage: Option<Vec<Point>>,
    window_pixel: Option<Vec<Point>>,
    window_content_percentage: Option<Vec<Point>>,
}

impl Converter {
    pub fn new(points: &[Point], frame: Frame, reference: &Reference, desktop: Size) -> Result<Self, CoordError> {
        if frame.is_percentage() {
            if let Some(bad) = points.iter().find(|p| !unit(p.x) || !unit(p.y)) {
                return Err(CoordError::InvalidCoordinate { x: bad.x, y: bad.y });
            }
        }

        let mut conv = Converter {
            screen_pixel: None,
            screen_percentage: None,
            window_pixel: None,
            window_content_percentage: None,
        };

        let window = match reference {
            Reference::Window(w) => Some(w),
            _ => None,
        };

        if let Some(screen) = to_screen_pixel(points, frame, window, desktop) {
            conv.screen_percentage = Some(
                screen.iter().map(|p| Point::new(p.x / desktop.w, p.y / desktop.h)).collect(),
            );
            if let Some(win) = window {
                let wp = screen_to_window_pixel(&screen, win)?;
                conv.window_content_percentage =
                    Some(pixel_to_content(&wp, win.size(), win.border)?);
                conv.window_pixel = Some(wp);
            }
            conv.screen_pixel = Some(screen);
        } else {
            let image = match reference {
                Reference::Image { size, calibration } => Some((*size, calibration.unwrap_or_default())),
                Reference::RawPixels(size) => Some((*size, BorderInset::default())),
                Reference::Window(_) => None,
            };
            match frame {
                Frame::WindowPixel => {
                    if let Some((size, border)) = image {
                        conv.window_content_percentage = Some(pixel_to_content(points, size, border)?);
                    }
                    conv.window_pixel = Some(points.to_vec());
                }
                Frame::WindowContentPercentage => {
                    if let Some((size, border)) = image {
                        conv.window_pixel = Some(content_to_pixel(points, size, border));
                    }
                    conv.window_content_percentage = Some(points.to_vec());
                }
                _ => {}
            }
        }

        // Against an image, window frames come in pairs or not at all
        if let Reference::Image { .. } = reference {
            match (&conv.window_pixel, &conv.window_content_percentage) {
                (Some(_), None) => return Err(CoordError::Underivable(Frame::WindowContentPercentage.name())),
                (None, Some(_)) => return Err(CoordError::Underivable(Frame::WindowPixel.name())),
                _ => {}
            }
        }

        Ok(conv)
    }

    pub fn get(&self, frame: Frame) -> Option<&[Point]> {
        match frame {
            Frame::ScreenPixel => self.screen_pixel.as_deref(),
            Frame::ScreenPercentage => self.screen_percentage.as_deref(),
            Frame::WindowPixel => self.window_pixel.as_deref(),
            Frame::WindowContentPercentage => self.window_content_percentage.as_deref(),
        }
    }

    pub fn point(&self, frame: Frame) -> Option<Point> {
        self.get(frame).and_then(|pts| pts.first().copied())
    }

    /// First two points in `frame` as a rectangle.
    pub fn rect(&self, frame: Frame) -> Option<Rect> {
        match self.get(frame)? {
            [p0, p1, ..] => Some(Rect::from_points(*p0, *p1)),
            _ => None,
        }
    }

    pub fn available(&self) -> Vec<Frame> {
        Frame::ALL.into_iter().filter(|f| self.get(*f).is_some()).collect()
    }
}

fn unit(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

fn to_screen_pixel(points: &[Point], frame: Frame, window: Option<&WindowGeometry>, desktop: Size) -> Option<Vec<Point>> {
    match (frame, window) {
        (Frame::ScreenPixel, _) => Some(points.to_vec()),
        (Frame::ScreenPercentage, _) => {
            Some(points.iter().map(|p| Point::new(p.x * desktop.w, p.y * desktop.h)).collect())
        }
        (Frame::WindowPixel, Some(win)) => {
            let o = win.origin();
            Some(points.iter().map(|p| Point::new(p.x + o.x, p.y + o.y)).collect())
        }
        (Frame::WindowContentPercentage, Some(win)) => {
            let o = win.origin();
            Some(
                content_to_pixel(points, win.size(), win.border)
                    .into_iter()
                    .map(|p| Point::new(p.x + o.x, p.y + o.y))
                    .collect(),
            )
        }
        _ => None,
    }
}

fn screen_to_window_pixel(screen: &[Point], win: &WindowGeometry) -> Result<Vec<Point>, CoordError> {
    let o = win.origin();
    let size = win.size();
    screen
        .iter()
        .map(|p| {
            let (x, y) = (p.x - o.x, p.y - o.y);
            if x < 0.0 || y < 0.0 || x > size.w || y > size.h {
                Err(CoordError::OutOfWindowBounds { x: p.x, y: p.y })
            } else {
                Ok(Point::new(x, y))
            }
        })
        .collect()
}

/// Border-inclusive pixels of an area of `size` to content percentages.
fn pixel_to_content(points: &[Point], size: Size, border: BorderInset) -> Result<Vec<Point>, CoordError> {
    let cw = size.w - border.left - border.right;
    let ch = size.h - border.top - border.bottom;
    points
        .iter()
        .map(|p| {
            let (x, y) = (p.x - border.left, p.y - border.top);
            if cw <= 0.0 || ch <= 0.0 || x < 0.0 || y < 0.0 || x > cw || y > ch {
                Err(CoordError::InBorderRegion { x: p.x, y: p.y })
            } else {
                Ok(Point::new(x / cw, y / ch))
            }
        })
        .collect()
}

fn content_to_pixel(points: &[Point], size: Size, border: BorderInset) -> Vec<Point> {
    let cw = size.w - border.left - border.right;
    let ch = size.h - border.top - border.bottom;
    points
        .iter()
        .map(|p| Point::new(p.x * cw + border.left, p.y * ch + border.top))
        .collect()
}

/// Map an annotation rectangle drawn on a reference screenshot onto the
/// live window, whatever its current position and size.
pub fn annotation_to_screen(
    rect: Rect,
    image: Size,
    border: BorderInset,
    window: WindowGeometry,
    desktop: Size,
) -> Result<Rect, CoordError> {
    let corners = rect.corners();
    let on_image = Converter::new(
        &corners,
        Frame::WindowPixel,
        &Reference::Image { size: image, calibration: Some(border) },
        desktop,
    )?;
    let content = on_image
        .get(Frame::WindowContentPercentage)
        .ok_or(CoordError::Underivable(Frame::WindowContentPercentage.name()))?;

    let live = Converter::new(content, Frame::WindowContentPercentage, &Reference::Window(window), desktop)?;
    live.rect(Frame::ScreenPixel)
        .ok_or(CoordError::Underivable(Frame::ScreenPixel.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP: Size = Size { w: 1920.0, h: 1080.0 };

    fn bordered_window() -> WindowGeometry {
        WindowGeometry::new(
            Region::from_ltwh(100, 50, 800, 600),
            BorderInset { left: 10.0, top: 20.0, right: 5.0, bottom: 15.0 },
        )
    }

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_content_percentage_round_trip_with_border() {
        let win = Reference::Window(bordered_window());
        let input = Point::new(0.25, 0.75);

        let forward = Converter::new(&[input], Frame::WindowContentPercentage, &win, DESKTOP).unwrap();
        let screen = forward.point(Frame::ScreenPixel).unwrap();
        assert!(close(screen, Point::new(110.0 + 0.25 * 785.0, 70.0 + 0.75 * 565.0)));

        let back = Converter::new(&[screen], Frame::ScreenPixel, &win, DESKTOP).unwrap();
        assert!(close(back.point(Frame::WindowContentPercentage).unwrap(), input));
        assert!(close(back.point(Frame::WindowPixel).unwrap(), Point::new(206.25, 443.75)));
    }

    #[test]
    fn test_percentage_out_of_range_rejected() {
        let win = Reference::Window(bordered_window());
        let err = Converter::new(&[Point::new(1.2, 0.5)], Frame::WindowContentPercentage, &win, DESKTOP)
            .unwrap_err();
        assert_eq!(err, CoordError::InvalidCoordinate { x: 1.2, y: 0.5 });

        let err = Converter::new(&[Point::new(0.5, -0.1)], Frame::ScreenPercentage, &win, DESKTOP)
            .unwrap_err();
        assert!(matches!(err, CoordError::InvalidCoordinate { .. }));

        let err = Converter::new(&[Point::new(f64::NAN, 0.5)], Frame::ScreenPercentage, &win, DESKTOP)
            .unwrap_err();
        assert!(matches!(err, CoordError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_point_in_border_region() {
        let win = Reference::Window(WindowGeometry::new(
            Region::from_ltwh(0, 0, 400, 300),
            BorderInset { left: 10.0, top: 10.0, right: 0.0, bottom: 0.0 },
        ));
        let err = Converter::new(&[Point::new(3.0, 3.0)], Frame::WindowPixel, &win, DESKTOP).unwrap_err();
        assert_eq!(err, CoordError::InBorderRegion { x: 3.0, y: 3.0 });
    }

    #[test]
    fn test_out_of_window_bounds() {
        let win = Reference::Window(bordered_window());
        let err = Converter::new(&[Point::new(50.0, 60.0)], Frame::ScreenPixel, &win, DESKTOP).unwrap_err();
        assert_eq!(err, CoordError::OutOfWindowBounds { x: 50.0, y: 60.0 });

        // Edges are inclusive
        let edge = Converter::new(&[Point::new(900.0, 650.0)], Frame::ScreenPixel, &win, DESKTOP);
        assert!(matches!(edge, Err(CoordError::InBorderRegion { .. })));
    }

    #[test]
    fn test_screen_frames_without_window() {
        let conv = Converter::new(
            &[Point::new(0.5, 0.25)],
            Frame::ScreenPercentage,
            &Reference::RawPixels(Size::new(10.0, 10.0)),
            DESKTOP,
        )
        .unwrap();
        assert!(close(conv.point(Frame::ScreenPixel).unwrap(), Point::new(960.0, 270.0)));
        assert_eq!(conv.available(), vec![Frame::ScreenPixel, Frame::ScreenPercentage]);
    }

    #[test]
    fn test_image_reference_with_calibration() {
        let reference = Reference::Image {
            size: Size::new(800.0, 600.0),
            calibration: Some(BorderInset { left: 10.0, top: 20.0, right: 5.0, bottom: 15.0 }),
        };
        let conv = Converter::new(&[Point::new(402.5, 302.5)], Frame::WindowPixel, &reference, DESKTOP).unwrap();
        assert!(close(conv.point(Frame::WindowContentPercentage).unwrap(), Point::new(0.5, 0.5)));
        assert_eq!(conv.available(), vec![Frame::WindowPixel, Frame::WindowContentPercentage]);

        let back = Converter::new(&[Point::new(0.5, 0.5)], Frame::WindowContentPercentage, &reference, DESKTOP)
            .unwrap();
        assert!(close(back.point(Frame::WindowPixel).unwrap(), Point::new(402.5, 302.5)));

        let err = Converter::new(&[Point::new(2.0, 2.0)], Frame::WindowPixel, &reference, DESKTOP).unwrap_err();
        assert!(matches!(err, CoordError::InBorderRegion { .. }));
    }

    #[test]
    fn test_image_reference_keeps_screen_frames() {
        let reference = Reference::Image { size: Size::new(800.0, 600.0), calibration: None };
        let conv = Converter::new(&[Point::new(5.0, 5.0)], Frame::ScreenPixel, &reference, DESKTOP).unwrap();
        assert!(close(conv.point(Frame::ScreenPixel).unwrap(), Point::new(5.0, 5.0)));
        assert!(close(conv.point(Frame::ScreenPercentage).unwrap(), Point::new(5.0 / 1920.0, 5.0 / 1080.0)));
        assert!(conv.get(Frame::WindowPixel).is_none());
        assert!(conv.get(Frame::WindowContentPercentage).is_none());

        let conv = Converter::new(&[Point::new(0.5, 0.5)], Frame::ScreenPercentage, &reference, DESKTOP).unwrap();
        assert!(close(conv.point(Frame::ScreenPixel).unwrap(), Point::new(960.0, 540.0)));
        assert_eq!(conv.available(), vec![Frame::ScreenPixel, Frame::ScreenPercentage]);
    }

    #[test]
    fn test_raw_pixels_scale_plainly() {
        let conv = Converter::new(
            &[Point::new(50.0, 25.0)],
            Frame::WindowPixel,
            &Reference::RawPixels(Size::new(100.0, 100.0)),
            DESKTOP,
        )
        .unwrap();
        assert!(close(conv.point(Frame::WindowContentPercentage).unwrap(), Point::new(0.5, 0.25)));
        assert!(conv.get(Frame::ScreenPixel).is_none());
    }

    #[test]
    fn test_image_file_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.png");
        image::GrayImage::new(64, 48).save(&path).unwrap();
        assert_eq!(
            Reference::image_file(&path, None).unwrap(),
            Reference::Image { size: Size::new(64.0, 48.0), calibration: None }
        );
        assert!(matches!(
            Reference::image_file(&dir.path().join("missing.png"), None),
            Err(CoordError::ImageUnreadable { .. })
        ));
    }

    #[test]
    fn test_annotation_follows_resized_window() {
        // Annotated on an 800x600 capture with a 10/20/5/15 border; the live
        // window is twice the content size and sits elsewhere.
        let border = BorderInset { left: 10.0, top: 20.0, right: 5.0, bottom: 15.0 };
        let live = WindowGeometry::new(Region::from_ltwh(300, 200, 10 + 1570 + 5, 20 + 1130 + 15), border);
        let rect = Rect::new(10.0 + 78.5, 20.0 + 56.5, 10.0 + 157.0, 20.0 + 113.0);

        let screen = annotation_to_screen(rect, Size::new(800.0, 600.0), border, live, Size::new(4000.0, 3000.0))
            .unwrap();
        assert!(close(screen.p0, Point::new(310.0 + 157.0, 220.0 + 113.0)));
        assert!(close(screen.p1, Point::new(310.0 + 314.0, 220.0 + 226.0)));
    }
}
