//! Pan/zoom lightbox model.
//!
//! The gallery embeds a small JavaScript viewer (`static/viewer.js`). This
//! module is the same state machine in Rust: it defines the constants the
//! script is generated with and lets the interaction rules be unit tested.
//!
//! ## States
//!
//! ```text
//!            open(src, title)
//!   Closed ────────────────────▶ Open(Session)
//!     ▲                              │  wheel / + / - / buttons → zoom_by
//!     │  close button, Escape,       │  press / drag / release  → pan
//!     │  backdrop click              │  0 / reset button        → reset
//!     └──────────────────────────────┘  double click            → toggle
//! ```
//!
//! A [`Transform`] maps image pixels to viewport pixels:
//! `screen = image × scale + (tx, ty)`. Zooming keeps the focal point's
//! screen position fixed and clamps the scale to `[0.02, 50]`.

use serde::Serialize;

pub const MIN_SCALE: f64 = 0.02;
pub const MAX_SCALE: f64 = 50.0;
pub const WHEEL_ZOOM_IN: f64 = 1.15;
pub const WHEEL_ZOOM_OUT: f64 = 0.87;
pub const STEP_ZOOM_IN: f64 = 1.4;
pub const STEP_ZOOM_OUT: f64 = 0.7;
/// Double click zooms by this factor when near the fit scale.
pub const TOGGLE_ZOOM: f64 = 3.0;
/// Above `fit × TOGGLE_THRESHOLD` a double click resets instead.
pub const TOGGLE_THRESHOLD: f64 = 1.5;
/// How long the usage hint stays visible after opening.
pub const HINT_MS: u32 = 3500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Transform {
    /// Screen position of an image-space point.
    pub fn to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.tx, p.y * self.scale + self.ty)
    }

    /// Image-space point under a screen position.
    pub fn to_image(&self, p: Point) -> Point {
        Point::new((p.x - self.tx) / self.scale, (p.y - self.ty) / self.scale)
    }
}

/// Largest scale that shows the whole image, never above 1.
pub fn fit_scale(image: Size, viewport: Size) -> f64 {
    if image.width <= 0.0 || image.height <= 0.0 {
        return 1.0;
    }
    (viewport.width / image.width)
        .min(viewport.height / image.height)
        .min(1.0)
}

/// The fitted transform: image centered in the viewport.
pub fn fit_transform(image: Size, viewport: Size) -> Transform {
    let scale = fit_scale(image, viewport);
    Transform {
        scale,
        tx: (viewport.width - image.width * scale) / 2.0,
        ty: (viewport.height - image.height * scale) / 2.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    start: Point,
    tx: f64,
    ty: f64,
}

/// An open lightbox.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub src: String,
    pub title: String,
    pub image: Size,
    pub viewport: Size,
    pub transform: Transform,
    drag: Option<Drag>,
}

impl Session {
    pub fn new(src: &str, title: &str, image: Size, viewport: Size) -> Self {
        Self {
            src: src.to_string(),
            title: title.to_string(),
            image,
            viewport,
            transform: fit_transform(image, viewport),
            drag: None,
        }
    }

    pub fn fit_scale(&self) -> f64 {
        fit_scale(self.image, self.viewport)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Multiply the scale by `factor` around `focal` (viewport center when
    /// `None`), clamped to `[MIN_SCALE, MAX_SCALE]`.
    pub fn zoom_by(&mut self, factor: f64, focal: Option<Point>) {
        let focal = focal.unwrap_or_else(|| self.viewport.center());
        let t = self.transform;
        let scale = (t.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = scale / t.scale;
        self.transform = Transform {
            scale,
            tx: focal.x - ratio * (focal.x - t.tx),
            ty: focal.y - ratio * (focal.y - t.ty),
        };
    }

    pub fn reset(&mut self) {
        self.transform = fit_transform(self.image, self.viewport);
    }

    /// Double click: back to fit when zoomed in, otherwise zoom in at `at`.
    pub fn toggle(&mut self, at: Point) {
        if self.transform.scale > self.fit_scale() * TOGGLE_THRESHOLD {
            self.reset();
        } else {
            self.zoom_by(TOGGLE_ZOOM, Some(at));
        }
    }

    pub fn press(&mut self, at: Point) {
        self.drag = Some(Drag {
            start: at,
            tx: self.transform.tx,
            ty: self.transform.ty,
        });
    }

    /// Pan so the image follows the pointer since `press`. No-op when no
    /// drag is active.
    pub fn drag_to(&mut self, at: Point) {
        if let Some(drag) = self.drag {
            self.transform.tx = drag.tx + (at.x - drag.start.x);
            self.transform.ty = drag.ty + (at.y - drag.start.y);
        }
    }

    pub fn release(&mut self) {
        self.drag = None;
    }
}

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    ZoomIn,
    ZoomOut,
    Reset,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Option<Self> {
        match key {
            "Escape" => Some(Key::Escape),
            "+" | "=" => Some(Key::ZoomIn),
            "-" => Some(Key::ZoomOut),
            "0" => Some(Key::Reset),
            _ => None,
        }
    }
}

/// Input events, as the script receives them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Wheel over the canvas; negative `delta_y` zooms in.
    Wheel { delta_y: f64, at: Point },
    ZoomInButton,
    ZoomOutButton,
    ResetButton,
    CloseButton,
    BackdropClick,
    Key(Key),
    Press(Point),
    Move(Point),
    Release,
    DoubleClick(Point),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Viewer {
    #[default]
    Closed,
    Open(Session),
}

impl Viewer {
    pub fn open(&mut self, src: &str, title: &str, image: Size, viewport: Size) {
        *self = Viewer::Open(Session::new(src, title, image, viewport));
    }

    pub fn close(&mut self) {
        *self = Viewer::Closed;
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Viewer::Open(session) => Some(session),
            Viewer::Closed => None,
        }
    }

    /// Apply one input event. Events while closed are ignored.
    pub fn handle(&mut self, event: Event) {
        let Viewer::Open(session) = self else {
            return;
        };
        match event {
            Event::CloseButton | Event::BackdropClick | Event::Key(Key::Escape) => self.close(),
            Event::Wheel { delta_y, at } => {
                let factor = if delta_y < 0.0 {
                    WHEEL_ZOOM_IN
                } else {
                    WHEEL_ZOOM_OUT
                };
                session.zoom_by(factor, Some(at));
            }
            Event::ZoomInButton | Event::Key(Key::ZoomIn) => session.zoom_by(STEP_ZOOM_IN, None),
            Event::ZoomOutButton | Event::Key(Key::ZoomOut) => {
                session.zoom_by(STEP_ZOOM_OUT, None)
            }
            Event::ResetButton | Event::Key(Key::Reset) => session.reset(),
            Event::Press(at) => session.press(at),
            Event::Move(at) => session.drag_to(at),
            Event::Release => session.release(),
            Event::DoubleClick(at) => session.toggle(at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsConstants {
    min_scale: f64,
    max_scale: f64,
    wheel_zoom_in: f64,
    wheel_zoom_out: f64,
    step_zoom_in: f64,
    step_zoom_out: f64,
    toggle_zoom: f64,
    toggle_threshold: f64,
    hint_ms: u32,
}

/// `const VIEWER = {...};` prepended to the viewer script.
pub fn js_constants() -> String {
    let constants = JsConstants {
        min_scale: MIN_SCALE,
        max_scale: MAX_SCALE,
        wheel_zoom_in: WHEEL_ZOOM_IN,
        wheel_zoom_out: WHEEL_ZOOM_OUT,
        step_zoom_in: STEP_ZOOM_IN,
        step_zoom_out: STEP_ZOOM_OUT,
        toggle_zoom: TOGGLE_ZOOM,
        toggle_threshold: TOGGLE_THRESHOLD,
        hint_ms: HINT_MS,
    };
    let json = serde_json::to_string(&constants).unwrap_or_else(|_| "{}".to_string());
    format!("const VIEWER = Object.freeze({json});\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn open(image: (f64, f64), viewport: (f64, f64)) -> Viewer {
        let mut viewer = Viewer::default();
        viewer.open(
            "images/a_ABC_T1.webp",
            "ABC T1",
            Size::new(image.0, image.1),
            Size::new(viewport.0, viewport.1),
        );
        viewer
    }

    fn session(viewer: &Viewer) -> &Session {
        viewer.session().expect("viewer should be open")
    }

    fn close_to(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
    }

    #[test]
    fn open_fits_and_centers() {
        let viewer = open((4000.0, 1000.0), (800.0, 600.0));
        let t = session(&viewer).transform;
        assert!((t.scale - 0.2).abs() < EPS);
        assert!((t.tx - 0.0).abs() < EPS);
        assert!((t.ty - 200.0).abs() < EPS);
    }

    #[test]
    fn small_images_are_never_upscaled_on_open() {
        let viewer = open((100.0, 50.0), (800.0, 600.0));
        let t = session(&viewer).transform;
        assert_eq!(t.scale, 1.0);
        assert_eq!((t.tx, t.ty), (350.0, 275.0));
    }

    #[test]
    fn zoom_keeps_focal_point_fixed() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        let focal = Point::new(123.0, 321.0);
        let under = session(&viewer).transform.to_image(focal);

        for event in [
            Event::Wheel {
                delta_y: -1.0,
                at: focal,
            },
            Event::Wheel {
                delta_y: -1.0,
                at: focal,
            },
            Event::Wheel {
                delta_y: 3.0,
                at: focal,
            },
        ] {
            viewer.handle(event);
            let after = session(&viewer).transform.to_screen(under);
            assert!(close_to(after, focal), "{after:?} != {focal:?}");
        }
        let expected = 0.2 * 1.15 * 1.15 * 0.87;
        assert!((session(&viewer).transform.scale - expected).abs() < EPS);
    }

    #[test]
    fn buttons_and_keys_zoom_around_center() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        let center = Point::new(400.0, 300.0);
        let under = session(&viewer).transform.to_image(center);

        viewer.handle(Event::ZoomInButton);
        assert!((session(&viewer).transform.scale - 0.28).abs() < EPS);
        viewer.handle(Event::Key(Key::ZoomOut));
        assert!((session(&viewer).transform.scale - 0.196).abs() < EPS);
        assert!(close_to(session(&viewer).transform.to_screen(under), center));
    }

    #[test]
    fn scale_is_clamped() {
        let mut viewer = open((100.0, 100.0), (800.0, 600.0));
        for _ in 0..100 {
            viewer.handle(Event::Key(Key::ZoomIn));
        }
        assert_eq!(session(&viewer).transform.scale, MAX_SCALE);
        for _ in 0..200 {
            viewer.handle(Event::Wheel {
                delta_y: 1.0,
                at: Point::new(10.0, 10.0),
            });
        }
        assert_eq!(session(&viewer).transform.scale, MIN_SCALE);
    }

    #[test]
    fn clamped_zoom_still_keeps_focal_point() {
        let mut viewer = open((100.0, 100.0), (800.0, 600.0));
        let focal = Point::new(50.0, 70.0);
        let under = session(&viewer).transform.to_image(focal);
        if let Viewer::Open(s) = &mut viewer {
            s.zoom_by(1000.0, Some(focal));
        }
        assert_eq!(session(&viewer).transform.scale, MAX_SCALE);
        assert!(close_to(session(&viewer).transform.to_screen(under), focal));
    }

    #[test]
    fn drag_pans_only_while_pressed() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        let start = session(&viewer).transform;

        viewer.handle(Event::Move(Point::new(500.0, 500.0)));
        assert_eq!(session(&viewer).transform, start);

        viewer.handle(Event::Press(Point::new(100.0, 100.0)));
        assert!(session(&viewer).is_dragging());
        viewer.handle(Event::Move(Point::new(130.0, 80.0)));
        viewer.handle(Event::Move(Point::new(150.0, 90.0)));
        let t = session(&viewer).transform;
        assert_eq!((t.tx, t.ty), (start.tx + 50.0, start.ty - 10.0));
        assert_eq!(t.scale, start.scale);

        viewer.handle(Event::Release);
        viewer.handle(Event::Move(Point::new(0.0, 0.0)));
        assert_eq!(session(&viewer).transform, t);
        assert!(!session(&viewer).is_dragging());
    }

    #[test]
    fn reset_returns_to_fit() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        let fit = session(&viewer).transform;
        viewer.handle(Event::ZoomInButton);
        viewer.handle(Event::Press(Point::new(0.0, 0.0)));
        viewer.handle(Event::Move(Point::new(40.0, 40.0)));
        viewer.handle(Event::Release);
        viewer.handle(Event::Key(Key::Reset));
        assert_eq!(session(&viewer).transform, fit);
    }

    #[test]
    fn double_click_toggles_between_fit_and_zoom() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        let fit = session(&viewer).transform;
        let at = Point::new(200.0, 300.0);

        viewer.handle(Event::DoubleClick(at));
        assert!((session(&viewer).transform.scale - 0.6).abs() < EPS);

        viewer.handle(Event::DoubleClick(at));
        assert_eq!(session(&viewer).transform, fit);
    }

    #[test]
    fn double_click_zooms_when_only_slightly_zoomed() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        // 0.2 × 1.4 = 0.28, below 0.2 × 1.5
        viewer.handle(Event::ZoomInButton);
        viewer.handle(Event::DoubleClick(Point::new(400.0, 300.0)));
        assert!((session(&viewer).transform.scale - 0.84).abs() < EPS);
    }

    #[test]
    fn close_paths_discard_state() {
        for event in [
            Event::CloseButton,
            Event::BackdropClick,
            Event::Key(Key::Escape),
        ] {
            let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
            viewer.handle(Event::ZoomInButton);
            viewer.handle(event);
            assert_eq!(viewer, Viewer::Closed);
        }
    }

    #[test]
    fn reopening_starts_from_fit() {
        let mut viewer = open((4000.0, 1000.0), (800.0, 600.0));
        viewer.handle(Event::DoubleClick(Point::new(0.0, 0.0)));
        viewer.handle(Event::CloseButton);
        viewer.open(
            "images/b.webp",
            "B",
            Size::new(4000.0, 1000.0),
            Size::new(800.0, 600.0),
        );
        assert!((session(&viewer).transform.scale - 0.2).abs() < EPS);
        assert_eq!(session(&viewer).title, "B");
    }

    #[test]
    fn events_while_closed_are_ignored() {
        let mut viewer = Viewer::default();
        viewer.handle(Event::ZoomInButton);
        viewer.handle(Event::Press(Point::new(1.0, 1.0)));
        assert_eq!(viewer, Viewer::Closed);
    }

    #[test]
    fn key_mapping() {
        assert_eq!(Key::from_dom("Escape"), Some(Key::Escape));
        assert_eq!(Key::from_dom("+"), Some(Key::ZoomIn));
        assert_eq!(Key::from_dom("="), Some(Key::ZoomIn));
        assert_eq!(Key::from_dom("-"), Some(Key::ZoomOut));
        assert_eq!(Key::from_dom("0"), Some(Key::Reset));
        assert_eq!(Key::from_dom("a"), None);
    }

    #[test]
    fn zero_sized_image_fits_at_unit_scale() {
        let viewer = open((0.0, 0.0), (800.0, 600.0));
        assert_eq!(session(&viewer).transform.scale, 1.0);
    }

    #[test]
    fn js_constants_carry_rust_values() {
        let js = js_constants();
        assert!(js.starts_with("const VIEWER = Object.freeze({"));
        assert!(js.contains(r#""minScale":0.02"#));
        assert!(js.contains(r#""maxScale":50.0"#));
        assert!(js.contains(r#""wheelZoomIn":1.15"#));
        assert!(js.contains(r#""wheelZoomOut":0.87"#));
        assert!(js.contains(r#""stepZoomIn":1.4"#));
        assert!(js.contains(r#""stepZoomOut":0.7"#));
        assert!(js.contains(r#""toggleZoom":3.0"#));
        assert!(js.contains(r#""toggleThreshold":1.5"#));
        assert!(js.contains(r#""hintMs":3500"#));
    }
}
