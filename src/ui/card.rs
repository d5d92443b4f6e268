use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const MAX_ITEMS: usize = 64;
pub const MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Card {
    Meta(MetaCard),
    Header(HeaderCard),
    Footer(FooterCard),
    Form(FormCard),
}

impl Card {
    pub fn zone(&self) -> &str {
        match self {
            Self::Meta(_) => "",
            Self::Header(card) => &card.zone,
            Self::Footer(card) => &card.zone,
            Self::Form(card) => &card.zone,
        }
    }

    pub fn items(&self) -> &[FormItem] {
        match self {
            Self::Meta(_) | Self::Footer(_) => &[],
            Self::Header(card) => &card.items,
            Self::Form(card) => &card.items,
        }
    }

    /// Names of the value-carrying items sent along with any trigger in the
    /// card. Triggering dropdowns and toggles only send their own value.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_field_names(self.items(), &mut names);
        names
    }
}

fn collect_field_names<'a>(items: &'a [FormItem], names: &mut Vec<&'a str>) {
    for item in items {
        match item {
            FormItem::Textbox { name, .. }
            | FormItem::Dropdown {
                name,
                trigger: false,
                ..
            }
            | FormItem::Toggle {
                name,
                trigger: false,
                ..
            }
            | FormItem::FileUpload { name, .. }
            | FormItem::ImageAnnotator { name, .. } => names.push(name),
            FormItem::Expander { items, .. } => collect_field_names(items, names),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeName {
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Column,
    Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            direction: Direction::Column,
            zones: Vec::new(),
        }
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn row(mut self, zones: Vec<Zone>) -> Self {
        self.direction = Direction::Row;
        self.zones = zones;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaCard {
    pub title: String,
    pub layout: Vec<Zone>,
    pub theme: ThemeName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderCard {
    #[serde(rename = "box")]
    pub zone: String,
    pub title: String,
    pub subtitle: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub items: Vec<FormItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterCard {
    #[serde(rename = "box")]
    pub zone: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormCard {
    #[serde(rename = "box")]
    pub zone: String,
    pub items: Vec<FormItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSize {
    #[default]
    Normal,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Justify {
    #[default]
    Start,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub primary: bool,
}

impl Button {
    pub fn primary(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            primary: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatorTag {
    pub name: String,
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorItem {
    pub tag: String,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl AnnotatorItem {
    /// Corners ordered so that (x1, y1) is the top-left one.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
            tag: self.tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub label: String,
    pub value: String,
    pub caption: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum FormItem {
    Text {
        content: String,
        #[serde(default)]
        size: TextSize,
    },
    Textbox {
        name: String,
        label: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        suffix: Option<String>,
    },
    Buttons {
        items: Vec<Button>,
        #[serde(default)]
        justify: Justify,
    },
    Separator,
    Dropdown {
        name: String,
        label: String,
        #[serde(default)]
        value: Option<String>,
        choices: Vec<Choice>,
        #[serde(default)]
        trigger: bool,
    },
    Toggle {
        name: String,
        label: String,
        value: bool,
        #[serde(default)]
        trigger: bool,
    },
    FileUpload {
        name: String,
        label: String,
        #[serde(default)]
        multiple: bool,
        #[serde(default)]
        extensions: Vec<String>,
    },
    Image {
        title: String,
        path: String,
    },
    ImageAnnotator {
        name: String,
        title: String,
        image: String,
        #[serde(default)]
        items: Vec<AnnotatorItem>,
        tags: Vec<AnnotatorTag>,
        #[serde(default)]
        image_height: Option<String>,
    },
    Stats {
        items: Vec<Stat>,
    },
    Link {
        label: String,
        path: String,
    },
    Expander {
        name: String,
        label: String,
        items: Vec<FormItem>,
    },
}

impl FormItem {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            size: TextSize::Normal,
        }
    }

    pub fn text_l(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            size: TextSize::Large,
        }
    }

    pub fn buttons(items: Vec<Button>, justify: Justify) -> Self {
        Self::Buttons { items, justify }
    }

    fn trigger_names(&self) -> Vec<&str> {
        match self {
            Self::Buttons { items, .. } => items.iter().map(|button| button.name.as_str()).collect(),
            Self::Dropdown {
                name,
                trigger: true,
                ..
            }
            | Self::Toggle {
                name,
                trigger: true,
                ..
            }
            | Self::FileUpload { name, .. } => vec![name.as_str()],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{field}` for item in card zone `{zone}`")]
    MissingRequiredField { zone: String, field: &'static str },
    #[error("card item count {actual} exceeds max {max}")]
    TooManyItems { max: usize, actual: usize },
    #[error("expander `{name}` nesting depth {actual} exceeds max {max}")]
    NestingTooDeep {
        max: usize,
        actual: usize,
        name: String,
    },
    #[error("duplicate trigger name `{name}`")]
    DuplicateTrigger { name: String },
    #[error("dropdown `{name}` value `{value}` is not one of its choices")]
    UnknownChoice { name: String, value: String },
}

pub fn validate_card(card: &Card) -> Result<(), ValidationError> {
    match card {
        Card::Meta(meta) => {
            if meta.layout.is_empty() {
                return Err(ValidationError::MissingRequiredField {
                    zone: String::new(),
                    field: "layout",
                });
            }
            Ok(())
        }
        Card::Footer(_) => Ok(()),
        Card::Header(_) | Card::Form(_) => {
            let mut counter = 0;
            let mut triggers = BTreeSet::new();
            validate_items(card.zone(), card.items(), 1, &mut counter, &mut triggers)
        }
    }
}

fn validate_items<'a>(
    zone: &str,
    items: &'a [FormItem],
    depth: usize,
    counter: &mut usize,
    triggers: &mut BTreeSet<&'a str>,
) -> Result<(), ValidationError> {
    for item in items {
        *counter += 1;
        if *counter > MAX_ITEMS {
            return Err(ValidationError::TooManyItems {
                max: MAX_ITEMS,
                actual: *counter,
            });
        }

        for name in item.trigger_names() {
            if name.is_empty() {
                return Err(ValidationError::MissingRequiredField {
                    zone: zone.to_string(),
                    field: "name",
                });
            }
            if !triggers.insert(name) {
                return Err(ValidationError::DuplicateTrigger {
                    name: name.to_string(),
                });
            }
        }

        match item {
            FormItem::Buttons { items, .. } => {
                if items.iter().any(|button| button.label.is_empty()) {
                    return Err(ValidationError::MissingRequiredField {
                        zone: zone.to_string(),
                        field: "label",
                    });
                }
            }
            FormItem::Dropdown {
                name,
                value: Some(value),
                choices,
                ..
            } => {
                if !choices.iter().any(|choice| &choice.name == value) {
                    return Err(ValidationError::UnknownChoice {
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            FormItem::ImageAnnotator { image, .. } | FormItem::Image { path: image, .. } => {
                if image.is_empty() {
                    return Err(ValidationError::MissingRequiredField {
                        zone: zone.to_string(),
                        field: "image",
                    });
                }
            }
            FormItem::Expander { name, items, .. } => {
                if depth + 1 > MAX_DEPTH {
                    return Err(ValidationError::NestingTooDeep {
                        max: MAX_DEPTH,
                        actual: depth + 1,
                        name: name.clone(),
                    });
                }
                validate_items(zone, items, depth + 1, counter, triggers)?;
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(items: Vec<FormItem>) -> Card {
        Card::Form(FormCard {
            zone: "main".to_string(),
            items,
        })
    }

    #[test]
    fn valid_form_passes() {
        let card = form(vec![
            FormItem::Textbox {
                name: "add_new_class".to_string(),
                label: "Add New Class".to_string(),
                value: None,
                suffix: None,
            },
            FormItem::buttons(vec![Button::primary("add", "Add")], Justify::Center),
            FormItem::Separator,
        ]);
        assert!(validate_card(&card).is_ok());
    }

    #[test]
    fn dropdown_without_choices_is_valid() {
        let card = form(vec![FormItem::Dropdown {
            name: "delete_existing_class".to_string(),
            label: "Delete Existing Class".to_string(),
            value: None,
            choices: Vec::new(),
            trigger: false,
        }]);
        assert!(validate_card(&card).is_ok());
    }

    #[test]
    fn duplicate_trigger_fails_validation() {
        let card = form(vec![
            FormItem::buttons(vec![Button::primary("go", "Go")], Justify::Start),
            FormItem::buttons(vec![Button::primary("go", "Again")], Justify::Start),
        ]);
        assert!(matches!(
            validate_card(&card),
            Err(ValidationError::DuplicateTrigger { .. })
        ));
    }

    #[test]
    fn dropdown_value_must_be_a_choice() {
        let card = form(vec![FormItem::Dropdown {
            name: "style_model".to_string(),
            label: "Style".to_string(),
            value: Some("cubism".to_string()),
            choices: vec![Choice {
                name: "candy".to_string(),
                label: "Candy".to_string(),
            }],
            trigger: true,
        }]);
        assert!(matches!(
            validate_card(&card),
            Err(ValidationError::UnknownChoice { .. })
        ));
    }

    #[test]
    fn item_count_limit_enforced() {
        let items = (0..=MAX_ITEMS).map(|_| FormItem::Separator).collect();
        assert!(matches!(
            validate_card(&form(items)),
            Err(ValidationError::TooManyItems { .. })
        ));
    }

    #[test]
    fn nesting_depth_limit_enforced() {
        let mut items = vec![FormItem::text("leaf")];
        for level in 0..MAX_DEPTH {
            items = vec![FormItem::Expander {
                name: format!("e{level}"),
                label: "Details".to_string(),
                items,
            }];
        }
        assert!(matches!(
            validate_card(&form(items)),
            Err(ValidationError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn field_names_skip_triggers_and_descend_into_expanders() {
        let card = form(vec![
            FormItem::Toggle {
                name: "try_your_image".to_string(),
                label: "Try".to_string(),
                value: false,
                trigger: true,
            },
            FormItem::Expander {
                name: "more".to_string(),
                label: "More".to_string(),
                items: vec![FormItem::Textbox {
                    name: "note".to_string(),
                    label: "Note".to_string(),
                    value: None,
                    suffix: None,
                }],
            },
        ]);
        assert_eq!(card.field_names(), vec!["note"]);
    }

    #[test]
    fn cards_serialize_with_box_and_kind() {
        let card = Card::Footer(FooterCard {
            zone: "footer".to_string(),
            caption: "hi".to_string(),
        });
        let value = serde_json::to_value(&card).expect("card should serialize");
        assert_eq!(value["kind"], "footer");
        assert_eq!(value["box"], "footer");
    }
}
