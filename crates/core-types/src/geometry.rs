use serde::{Deserialize, Serialize};

use crate::DeskError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned box given by its top-left and bottom-right corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point {
        Point::new(
            ((i64::from(self.x1) + i64::from(self.x2)) / 2) as i32,
            ((i64::from(self.y1) + i64::from(self.y2)) / 2) as i32,
        )
    }

    pub fn start(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn end(&self) -> Point {
        Point::new(self.x2, self.y2)
    }
}

/// Parsed form of the raw coordinate list carried by plans and elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coordinates {
    Point(Point),
    Rect(Rect),
}

impl Coordinates {
    pub fn parse(raw: &[i32]) -> Result<Self, DeskError> {
        match raw {
            [x, y] => Ok(Coordinates::Point(Point::new(*x, *y))),
            [x1, y1, x2, y2] => Ok(Coordinates::Rect(Rect::new(*x1, *y1, *x2, *y2))),
            other => Err(DeskError::MalformedCoordinates(other.len())),
        }
    }

    /// Point an action aimed at these coordinates lands on.
    pub fn anchor(&self) -> Point {
        match self {
            Coordinates::Point(point) => *point,
            Coordinates::Rect(rect) => rect.center(),
        }
    }
}
