//! Stick-figure model of a mechanism for dashboards.
//!
//! A mechanism is a canvas with named roots; each root carries a tree of
//! ligaments whose angles are relative to their parent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color8Bit {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color8Bit {
    pub const ALICE_BLUE: Color8Bit = Color8Bit::new(240, 248, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ligament {
    pub name: String,
    pub length: f64,
    pub angle_deg: f64,
    pub line_width: f64,
    pub color: Color8Bit,
    pub children: Vec<Ligament>,
}

impl Ligament {
    pub fn new(
        name: impl Into<String>,
        length: f64,
        angle_deg: f64,
        line_width: f64,
        color: Color8Bit,
    ) -> Self {
        Self {
            name: name.into(),
            length,
            angle_deg,
            line_width,
            color,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Ligament) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_angle(&mut self, degrees: f64) {
        self.angle_deg = degrees;
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Ligament> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(name))
    }

    fn find(&self, name: &str) -> Option<&Ligament> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    fn collect_segments(&self, from: [f64; 2], parent_deg: f64, out: &mut Vec<Segment>) {
        let heading = parent_deg + self.angle_deg;
        let rad = heading.to_radians();
        let to = [
            from[0] + self.length * rad.cos(),
            from[1] + self.length * rad.sin(),
        ];
        out.push(Segment {
            name: self.name.clone(),
            from,
            to,
            line_width: self.line_width,
            color: self.color,
        });
        for child in &self.children {
            child.collect_segments(to, heading, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismRoot {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub ligaments: Vec<Ligament>,
}

impl MechanismRoot {
    pub fn append(&mut self, ligament: Ligament) -> &mut Ligament {
        self.ligaments.push(ligament);
        let last = self.ligaments.len() - 1;
        &mut self.ligaments[last]
    }
}

/// Absolute line segment, in canvas units, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub from: [f64; 2],
    pub to: [f64; 2],
    pub line_width: f64,
    pub color: Color8Bit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mechanism2d {
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub roots: Vec<MechanismRoot>,
}

impl Mechanism2d {
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            roots: Vec::new(),
        }
    }

    /// Root named `name`, created at `(x, y)` if it does not exist yet.
    pub fn root(&mut self, name: &str, x: f64, y: f64) -> &mut MechanismRoot {
        let idx = match self.roots.iter().position(|root| root.name == name) {
            Some(idx) => idx,
            None => {
                self.roots.push(MechanismRoot {
                    name: name.to_string(),
                    x,
                    y,
                    ligaments: Vec::new(),
                });
                self.roots.len() - 1
            }
        };
        &mut self.roots[idx]
    }

    pub fn ligament(&self, name: &str) -> Option<&Ligament> {
        self.roots
            .iter()
            .flat_map(|root| root.ligaments.iter())
            .find_map(|ligament| ligament.find(name))
    }

    pub fn ligament_mut(&mut self, name: &str) -> Option<&mut Ligament> {
        self.roots
            .iter_mut()
            .flat_map(|root| root.ligaments.iter_mut())
            .find_map(|ligament| ligament.find_mut(name))
    }

    pub fn segments(&self) -> Vec<Segment> {
        let mut out = Vec::new();
        for root in &self.roots {
            for ligament in &root.ligaments {
                ligament.collect_segments([root.x, root.y], 0.0, &mut out);
            }
        }
        out
    }
}
