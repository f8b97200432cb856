use crate::audio::track::FrequencyTrack;
use crate::error::{CorrectionError, MIN_VOICED_FRAMES};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Number of most frequent pitches compared against each template.
pub const TOP_PITCHES: usize = 7;

/// Octave the default catalog templates start in (C4 = MIDI 60).
pub const CATALOG_OCTAVE: i8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    root: Note,
    scale: Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Major,
    Minor,
}

impl Note {
    fn semitone(self) -> i8 {
        match self {
            Note::C => 0,
            Note::Cs => 1,
            Note::D => 2,
            Note::Ds => 3,
            Note::E => 4,
            Note::F => 5,
            Note::Fs => 6,
            Note::G => 7,
            Note::Gs => 8,
            Note::A => 9,
            Note::As => 10,
            Note::B => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Note::C => "C",
            Note::Cs => "C#",
            Note::D => "D",
            Note::Ds => "D#",
            Note::E => "E",
            Note::F => "F",
            Note::Fs => "F#",
            Note::G => "G",
            Note::Gs => "G#",
            Note::A => "A",
            Note::As => "A#",
            Note::B => "B",
        }
    }
}

impl FromStr for Note {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" | "do" => Ok(Note::C),
            "c#" | "db" => Ok(Note::Cs),
            "d" | "re" => Ok(Note::D),
            "d#" | "eb" => Ok(Note::Ds),
            "e" | "mi" => Ok(Note::E),
            "f" | "fa" => Ok(Note::F),
            "f#" | "gb" => Ok(Note::Fs),
            "g" | "sol" => Ok(Note::G),
            "g#" | "ab" => Ok(Note::Gs),
            "a" | "la" => Ok(Note::A),
            "a#" | "bb" => Ok(Note::As),
            "b" | "si" => Ok(Note::B),
            _ => Err(format!("Invalid note: {}", s)),
        }
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" | "mayor" => Ok(Scale::Major),
            "minor" | "menor" => Ok(Scale::Minor),
            _ => Err(format!("Invalid scale: {}", s)),
        }
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let root = parts.next().ok_or("Missing root note")?.parse::<Note>()?;
        let scale = parts.next().ok_or("Missing scale")?.parse::<Scale>()?;
        if parts.next().is_some() {
            return Err(format!("Unexpected trailing input in key: {}", s));
        }
        Ok(Key { root, scale })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = match self.scale {
            Scale::Major => "Major",
            Scale::Minor => "Minor",
        };
        write!(f, "{} {}", self.root.name(), scale)
    }
}

impl Key {
    pub fn new(root: Note, scale: Scale) -> Self {
        Self { root, scale }
    }

    pub fn root(&self) -> Note {
        self.root
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// One octave of the key starting at the root in `octave` (MIDI octave -1
    /// starts at note 0). Notes outside 0..=127 are skipped.
    pub fn midi_octave(&self, octave: i8) -> Vec<u8> {
        let intervals: &[i16] = match self.scale {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
        };
        let base = (octave as i16 + 1) * 12 + self.root.semitone() as i16;
        intervals
            .iter()
            .map(|interval| base + interval)
            .filter(|midi| (0..=127).contains(midi))
            .map(|midi| midi as u8)
            .collect()
    }
}

pub fn frequency_to_midi_note(freq: f32) -> f32 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

pub fn midi_note_to_frequency(midi_note: f32) -> f32 {
    440.0 * 2f32.powf((midi_note - 69.0) / 12.0)
}

/// A named set of allowed pitches, as strictly increasing MIDI note values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleTemplate {
    name: String,
    notes: Vec<f32>,
    key: Option<Key>,
}

impl ScaleTemplate {
    pub fn new(name: impl Into<String>, notes: Vec<f32>) -> Result<Self, CorrectionError> {
        let name = name.into();
        if notes.is_empty() {
            return Err(CorrectionError::invalid(format!(
                "scale template '{}' has no notes",
                name
            )));
        }
        if notes.iter().any(|n| !n.is_finite()) {
            return Err(CorrectionError::invalid(format!(
                "scale template '{}' contains a non-finite pitch",
                name
            )));
        }
        if notes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CorrectionError::invalid(format!(
                "scale template '{}' must be strictly increasing",
                name
            )));
        }
        Ok(Self {
            name,
            notes,
            key: None,
        })
    }

    /// Template covering one octave of `key`, starting in `octave`.
    pub fn from_key(
        name: impl Into<String>,
        key: Key,
        octave: i8,
    ) -> Result<Self, CorrectionError> {
        let notes = key.midi_octave(octave).into_iter().map(f32::from).collect();
        let mut template = Self::new(name, notes)?;
        template.key = Some(key);
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notes(&self) -> &[f32] {
        &self.notes
    }

    pub fn key(&self) -> Option<Key> {
        self.key
    }

    /// The template note closest to `midi`. On an exact tie the lower note
    /// wins, which is also the earlier one since notes are increasing.
    pub fn nearest(&self, midi: f32) -> f32 {
        let mut best = self.notes[0];
        let mut best_dist = (best - midi).abs();
        for &note in &self.notes[1..] {
            let dist = (note - midi).abs();
            if dist < best_dist {
                best = note;
                best_dist = dist;
            }
        }
        best
    }

    fn contains_pitch(&self, pitch: i32) -> bool {
        self.notes.iter().any(|&n| n == pitch as f32)
    }
}

/// Ordered, immutable collection of scale templates.
///
/// Order matters: when two templates match a track equally well, the one
/// listed first wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleCatalog {
    templates: Vec<ScaleTemplate>,
}

impl ScaleCatalog {
    pub fn new(templates: Vec<ScaleTemplate>) -> Result<Self, CorrectionError> {
        if templates.is_empty() {
            return Err(CorrectionError::invalid("scale catalog is empty"));
        }
        for (i, template) in templates.iter().enumerate() {
            if templates[..i].iter().any(|t| t.name == template.name) {
                return Err(CorrectionError::invalid(format!(
                    "duplicate scale name '{}'",
                    template.name
                )));
            }
        }
        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[ScaleTemplate] {
        &self.templates
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScaleTemplate> {
        self.templates.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ScaleTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Builds one template per `(name, key)` entry, in order, each spanning
    /// one octave from the key's root in `octave`. Fails on the first entry
    /// that does not yield a valid template.
    pub fn from_keys<'a>(
        entries: impl IntoIterator<Item = (&'a str, Key)>,
        octave: i8,
    ) -> Result<Self, CorrectionError> {
        let templates = entries
            .into_iter()
            .map(|(name, key)| ScaleTemplate::from_key(name, key, octave))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(templates)
    }

    /// Looks a template up by exact name, case-insensitive name, or key
    /// notation such as "A minor" or "re mayor".
    pub fn find(&self, query: &str) -> Option<&ScaleTemplate> {
        let query = query.trim();
        if let Some(template) = self.get(query) {
            return Some(template);
        }
        if let Some(template) = self
            .templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(query))
        {
            return Some(template);
        }
        let key = query.parse::<Key>().ok()?;
        self.templates.iter().find(|t| t.key == Some(key))
    }
}

impl Default for ScaleCatalog {
    fn default() -> Self {
        let entries = [
            ("Do Mayor (C Major)", Key::new(Note::C, Scale::Major)),
            ("Re Mayor (D Major)", Key::new(Note::D, Scale::Major)),
            ("Mi Menor (E Minor)", Key::new(Note::E, Scale::Minor)),
            ("La Menor (A Minor)", Key::new(Note::A, Scale::Minor)),
        ];
        Self::from_keys(entries, CATALOG_OCTAVE).expect("default scale table is valid")
    }
}

/// Picks the catalog template that best explains the pitches in `track`.
///
/// Voiced frames are rounded to whole MIDI notes and counted; the
/// [`TOP_PITCHES`] most frequent notes (ties go to the note heard first) are
/// intersected with every template and the largest overlap wins, with ties
/// going to the template listed first in the catalog.
pub fn estimate_scale<'a>(
    track: &FrequencyTrack,
    catalog: &'a ScaleCatalog,
) -> Result<&'a ScaleTemplate, CorrectionError> {
    let notes: Vec<i32> = track
        .voiced()
        // halves go to the even note
        .map(|(_, hz)| frequency_to_midi_note(hz).round_ties_even() as i32)
        .collect();
    if notes.len() < MIN_VOICED_FRAMES {
        return Err(CorrectionError::InsufficientData {
            voiced: notes.len(),
        });
    }

    // (note, count) in order of first occurrence
    let mut histogram: Vec<(i32, usize)> = Vec::new();
    let mut slots: HashMap<i32, usize> = HashMap::new();
    for &note in &notes {
        match slots.get(&note) {
            Some(&slot) => histogram[slot].1 += 1,
            None => {
                slots.insert(note, histogram.len());
                histogram.push((note, 1));
            }
        }
    }
    // stable sort keeps first-occurrence order among equal counts
    histogram.sort_by(|a, b| b.1.cmp(&a.1));
    let top: Vec<i32> = histogram
        .iter()
        .take(TOP_PITCHES)
        .map(|&(note, _)| note)
        .collect();
    debug!(voiced = notes.len(), distinct = histogram.len(), ?top, "Pitch histogram");

    let mut best: Option<(&ScaleTemplate, usize)> = None;
    for template in catalog.iter() {
        let overlap = top.iter().filter(|&&n| template.contains_pitch(n)).count();
        debug!(scale = template.name(), overlap, "Scale match");
        if best.is_none_or(|(_, best_overlap)| overlap > best_overlap) {
            best = Some((template, overlap));
        }
    }
    best.map(|(template, _)| template)
        .ok_or_else(|| CorrectionError::invalid("scale catalog is empty"))
}
