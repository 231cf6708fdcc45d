//! Facet presentation.
//!
//! Renderers turn a resolved value set and the current selection into a
//! `FacetControl`, a markup-free description of the control to draw. The
//! host's theme layer owns the actual markup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::{DisplayStyle, FacetSpec, FacetValueSet, Selection};

/// One option of a choice control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlOption {
    pub value_id: String,
    pub label: String,
    /// Only present when the facet shows counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub checked: bool,
    /// 0 for roots, 1 for children.
    pub depth: u8,
    /// Hidden until the parent is expanded.
    #[serde(default)]
    pub collapsed: bool,
    /// Beyond the truncation limit ("show more").
    #[serde(default)]
    pub overflow: bool,
}

/// Markup-free description of a facet control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "snake_case")]
pub enum FacetControl {
    Choice {
        facet_id: String,
        label: Option<String>,
        style: DisplayStyle,
        /// Several options may be checked at once.
        multiple: bool,
        /// Leading "any" option (dropdowns).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        options: Vec<ControlOption>,
    },
    Range {
        facet_id: String,
        label: Option<String>,
        min: f64,
        max: f64,
        current_min: f64,
        current_max: f64,
        /// Bounds collapse to a single value.
        disabled: bool,
    },
}

impl FacetControl {
    pub fn facet_id(&self) -> &str {
        match self {
            FacetControl::Choice { facet_id, .. } | FacetControl::Range { facet_id, .. } => {
                facet_id
            }
        }
    }
}

/// Presentation collaborator for one display style.
pub trait FacetRenderer: Send + Sync {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl;
}

/// Checkbox list; any number of values.
pub struct CheckboxRenderer;

impl FacetRenderer for CheckboxRenderer {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        choice(spec, values, selection, DisplayStyle::Checkbox, true, None)
    }
}

/// Radio buttons; a single value.
pub struct RadioRenderer;

impl FacetRenderer for RadioRenderer {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        choice(spec, values, selection, DisplayStyle::Radio, false, None)
    }
}

/// Plain link list; each value toggles independently.
pub struct ListRenderer;

impl FacetRenderer for ListRenderer {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        choice(spec, values, selection, DisplayStyle::List, true, None)
    }
}

/// Single-choice dropdown with an "any" option.
pub struct DropdownRenderer {
    pub placeholder: String,
}

impl Default for DropdownRenderer {
    fn default() -> Self {
        Self {
            placeholder: "Any".to_string(),
        }
    }
}

impl FacetRenderer for DropdownRenderer {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        let mut control = choice(
            spec,
            values,
            selection,
            DisplayStyle::Dropdown,
            false,
            Some(self.placeholder.clone()),
        );
        expand_all(&mut control);
        control
    }
}

/// Multi-select box.
pub struct MultiSelectRenderer;

impl FacetRenderer for MultiSelectRenderer {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        let mut control = choice(spec, values, selection, DisplayStyle::MultiSelect, true, None);
        expand_all(&mut control);
        control
    }
}

/// Numeric range slider.
pub struct RangeRenderer;

impl FacetRenderer for RangeRenderer {
    fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        let bounds = values.bounds.unwrap_or_default();
        let chosen: Vec<f64> = selection
            .map(|s| {
                s.values
                    .iter()
                    .filter_map(|v| v.parse::<f64>().ok())
                    .filter(|n| n.is_finite())
                    .take(2)
                    .collect()
            })
            .unwrap_or_default();
        let (lo, hi) = match chosen.as_slice() {
            [a, b, ..] => (a.min(*b), a.max(*b)),
            [only] => (*only, *only),
            [] => (bounds.min, bounds.max),
        };

        FacetControl::Range {
            facet_id: spec.id.clone(),
            label: spec.label.clone(),
            min: bounds.min,
            max: bounds.max,
            current_min: lo.clamp(bounds.min, bounds.max),
            current_max: hi.clamp(bounds.min, bounds.max),
            disabled: bounds.is_degenerate(),
        }
    }
}

/// Select boxes list every value.
fn expand_all(control: &mut FacetControl) {
    if let FacetControl::Choice { options, .. } = control {
        for option in options {
            option.overflow = false;
            option.collapsed = false;
        }
    }
}

fn choice(
    spec: &FacetSpec,
    values: &FacetValueSet,
    selection: Option<&Selection>,
    style: DisplayStyle,
    multiple: bool,
    placeholder: Option<String>,
) -> FacetControl {
    let is_checked = |value_id: &str| selection.is_some_and(|s| s.contains(value_id));
    // Single-choice controls only reflect the first chosen value.
    let single = selection
        .and_then(|s| s.values.first())
        .map(String::as_str);

    let mut options = Vec::with_capacity(values.values.len());
    let mut shown_roots = 0usize;
    // Children directly follow their root and share its overflow.
    let mut root_overflow = false;
    for value in &values.values {
        let depth = u8::from(value.parent.is_some());
        let checked = if multiple {
            is_checked(&value.value_id)
        } else {
            single == Some(value.value_id.as_str())
        };
        let parent_checked = value.parent.as_deref().is_some_and(is_checked);
        let overflow = if depth == 0 {
            shown_roots += 1;
            root_overflow = spec
                .truncate_after
                .is_some_and(|limit| shown_roots > limit && !checked);
            root_overflow
        } else {
            root_overflow && !checked
        };

        options.push(ControlOption {
            value_id: value.value_id.clone(),
            label: value.label.clone(),
            count: if spec.show_count { value.count } else { None },
            checked,
            depth,
            collapsed: spec.child_toggle && depth > 0 && !checked && !parent_checked,
            overflow,
        });
    }

    FacetControl::Choice {
        facet_id: spec.id.clone(),
        label: spec.label.clone(),
        style,
        multiple,
        placeholder,
        options,
    }
}

/// Renderers keyed by display style.
pub struct RendererRegistry {
    renderers: HashMap<DisplayStyle, Box<dyn FacetRenderer>>,
}

impl RendererRegistry {
    /// An empty registry; unregistered styles fall back to checkboxes.
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// Register (or replace) the renderer for a style.
    pub fn register(&mut self, style: DisplayStyle, renderer: Box<dyn FacetRenderer>) {
        self.renderers.insert(style, renderer);
    }

    /// Present a facet with the renderer for its display style.
    pub fn present(
        &self,
        spec: &FacetSpec,
        values: &FacetValueSet,
        selection: Option<&Selection>,
    ) -> FacetControl {
        match self.renderers.get(&spec.display) {
            Some(renderer) => renderer.present(spec, values, selection),
            None => CheckboxRenderer.present(spec, values, selection),
        }
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DisplayStyle::Checkbox, Box::new(CheckboxRenderer));
        registry.register(DisplayStyle::Radio, Box::new(RadioRenderer));
        registry.register(DisplayStyle::List, Box::new(ListRenderer));
        registry.register(DisplayStyle::Dropdown, Box::new(DropdownRenderer::default()));
        registry.register(DisplayStyle::MultiSelect, Box::new(MultiSelectRenderer));
        registry.register(DisplayStyle::Range, Box::new(RangeRenderer));
        registry
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut styles: Vec<&DisplayStyle> = self.renderers.keys().collect();
        styles.sort_by_key(|s| format!("{s:?}"));
        f.debug_struct("RendererRegistry")
            .field("styles", &styles)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::facet::{FacetValue, NumericBounds, SourceKind};
    use chrono::Utc;
    use std::time::Duration;

    fn value_set(n: usize) -> FacetValueSet {
        let mut set = FacetValueSet::empty("color", Utc::now(), Duration::from_secs(60));
        set.values = (0..n)
            .map(|i| {
                let mut v = FacetValue::new(format!("v{i}"), format!("Value {i}"));
                v.count = Some(i as u64);
                v
            })
            .collect();
        set
    }

    fn options(control: &FacetControl) -> &[ControlOption] {
        match control {
            FacetControl::Choice { options, .. } => options,
            FacetControl::Range { .. } => panic!("expected a choice control"),
        }
    }

    #[test]
    fn checkbox_marks_selection_and_truncates() {
        let spec = FacetSpec::new("color", SourceKind::Field, "color");
        let sel = Selection::for_spec(&spec, ["v7"]);
        let control = RendererRegistry::default().present(&spec, &value_set(8), Some(&sel));

        let opts = options(&control);
        assert_eq!(opts.iter().filter(|o| o.checked).count(), 1);
        assert!(!opts[5].overflow);
        assert!(opts[6].overflow);
        // Checked values are never hidden behind "show more".
        assert!(!opts[7].overflow);
        assert!(opts.iter().all(|o| o.count.is_none()));
    }

    #[test]
    fn children_follow_root_overflow() {
        let mut spec = FacetSpec::new("topics", SourceKind::Taxonomy, "topics");
        spec.hierarchical = true;
        spec.truncate_after = Some(1);
        let mut set = value_set(2);
        let mut child = FacetValue::new("c1", "Child");
        child.parent = Some("v1".into());
        set.values.push(child);

        let control = RendererRegistry::default().present(&spec, &set, None);
        let overflow: Vec<bool> = options(&control).iter().map(|o| o.overflow).collect();
        assert_eq!(overflow, vec![false, true, true]);
    }

    #[test]
    fn radio_checks_only_first_value() {
        let mut spec = FacetSpec::new("color", SourceKind::Field, "color");
        spec.display = DisplayStyle::Radio;
        spec.show_count = true;
        let sel = Selection::for_spec(&spec, ["v1", "v2"]);
        let control = RendererRegistry::default().present(&spec, &value_set(3), Some(&sel));

        let opts = options(&control);
        let checked: Vec<&str> = opts
            .iter()
            .filter(|o| o.checked)
            .map(|o| o.value_id.as_str())
            .collect();
        assert_eq!(checked, vec!["v1"]);
        assert_eq!(opts[2].count, Some(2));
    }

    #[test]
    fn dropdown_has_placeholder_and_no_overflow() {
        let mut spec = FacetSpec::new("color", SourceKind::Field, "color");
        spec.display = DisplayStyle::Dropdown;
        let control = RendererRegistry::default().present(&spec, &value_set(10), None);

        match &control {
            FacetControl::Choice {
                placeholder,
                options,
                multiple,
                ..
            } => {
                assert_eq!(placeholder.as_deref(), Some("Any"));
                assert!(!multiple);
                assert!(options.iter().all(|o| !o.overflow));
            }
            FacetControl::Range { .. } => panic!("expected a choice control"),
        }
    }

    #[test]
    fn child_toggle_collapses_unselected_children() {
        let mut spec = FacetSpec::new("topics", SourceKind::Taxonomy, "topics");
        spec.hierarchical = true;
        spec.child_toggle = true;
        let mut set = value_set(1);
        let mut child = FacetValue::new("c", "Child");
        child.parent = Some("v0".into());
        set.values.push(child);

        let control = RendererRegistry::default().present(&spec, &set, None);
        assert!(options(&control)[1].collapsed);

        let sel = Selection::for_spec(&spec, ["v0"]);
        let control = RendererRegistry::default().present(&spec, &set, Some(&sel));
        assert!(!options(&control)[1].collapsed);
    }

    #[test]
    fn range_clamps_selection() {
        let spec = FacetSpec::new("price", SourceKind::NumericField, "price");
        let mut set = value_set(0);
        set.bounds = Some(NumericBounds {
            min: 10.0,
            max: 100.0,
        });
        let sel = Selection::for_spec(&spec, ["500", "20"]);
        let control = RendererRegistry::default().present(&spec, &set, Some(&sel));

        assert_eq!(
            control,
            FacetControl::Range {
                facet_id: "price".into(),
                label: None,
                min: 10.0,
                max: 100.0,
                current_min: 20.0,
                current_max: 100.0,
                disabled: false,
            }
        );
    }

    #[test]
    fn degenerate_range_is_disabled() {
        let spec = FacetSpec::new("price", SourceKind::NumericField, "price");
        let control = RendererRegistry::default().present(&spec, &value_set(0), None);
        match control {
            FacetControl::Range { disabled, .. } => assert!(disabled),
            FacetControl::Choice { .. } => panic!("expected a range control"),
        }
    }

    #[test]
    fn unregistered_style_falls_back_to_checkbox() {
        let mut spec = FacetSpec::new("color", SourceKind::Field, "color");
        spec.display = DisplayStyle::Radio;
        let control = RendererRegistry::empty().present(&spec, &value_set(2), None);
        match control {
            FacetControl::Choice { style, .. } => assert_eq!(style, DisplayStyle::Checkbox),
            FacetControl::Range { .. } => panic!("expected a choice control"),
        }
    }
}
