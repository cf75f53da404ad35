use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

/// A detected on-screen element, as reported by the perception side.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UIElement {
    pub id: u32,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub coordinates: Vec<i32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl UIElement {
    pub fn new(id: u32, element_type: impl Into<String>, coordinates: Vec<i32>) -> Self {
        Self {
            id,
            element_type: element_type.into(),
            description: String::new(),
            coordinates,
            text: None,
            confidence: 1.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Bounding box, when at least four coordinates were reported.
    pub fn bounds(&self) -> Option<Rect> {
        match self.coordinates.as_slice() {
            [x1, y1, x2, y2, ..] => Some(Rect::new(*x1, *y1, *x2, *y2)),
            _ => None,
        }
    }

    pub fn center(&self) -> Option<Point> {
        self.bounds().map(|rect| rect.center())
    }
}

/// Read-only element map for one task, keyed by the element id rendered as text.
#[derive(Clone, Debug, Default)]
pub struct ElementSnapshot {
    elements: HashMap<String, UIElement>,
}

impl ElementSnapshot {
    pub fn new(elements: impl IntoIterator<Item = UIElement>) -> Self {
        let elements = elements
            .into_iter()
            .map(|element| (element.id.to_string(), element))
            .collect();
        Self { elements }
    }

    pub fn get(&self, id: &str) -> Option<&UIElement> {
        self.elements.get(id.trim())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UIElement> {
        self.elements.values()
    }
}
