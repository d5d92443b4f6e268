use crate::ui::card::{validate_card, Card, MetaCard, ValidationError, Zone};
use serde::Serialize;
use std::collections::BTreeMap;

/// Cards currently shown to one client, keyed by card name.
#[derive(Debug, Clone, Default)]
pub struct Page {
    cards: BTreeMap<String, Card>,
    revision: u64,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, card: Card) -> Result<(), ValidationError> {
        validate_card(&card)?;
        self.cards.insert(name.into(), card);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Card> {
        self.cards.remove(name)
    }

    pub fn clear(&mut self, names: &[String]) {
        for name in names {
            self.cards.remove(name);
        }
    }

    pub fn save(&mut self) -> PageSnapshot {
        self.revision += 1;
        PageSnapshot {
            revision: self.revision,
            cards: self
                .cards
                .iter()
                .map(|(name, card)| (name.clone(), card.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub revision: u64,
    pub cards: Vec<(String, Card)>,
}

impl PageSnapshot {
    pub fn card(&self, name: &str) -> Option<&Card> {
        self.cards
            .iter()
            .find(|(card_name, _)| card_name == name)
            .map(|(_, card)| card)
    }

    pub fn meta(&self) -> Option<&MetaCard> {
        self.cards.iter().find_map(|(_, card)| match card {
            Card::Meta(meta) => Some(meta),
            _ => None,
        })
    }

    pub fn cards_in_zone<'a>(&'a self, zone: &'a str) -> impl Iterator<Item = (&'a str, &'a Card)> {
        self.cards
            .iter()
            .filter(move |(_, card)| card.zone() == zone)
            .map(|(name, card)| (name.as_str(), card))
    }

    /// Cards whose box is not a zone of the meta layout.
    pub fn unplaced(&self) -> Vec<(&str, &Card)> {
        let zones = self.meta().map(|meta| leaf_zones(&meta.layout)).unwrap_or_default();
        self.cards
            .iter()
            .filter(|(_, card)| !matches!(card, Card::Meta(_)))
            .filter(|(_, card)| !zones.contains(&card.zone()))
            .map(|(name, card)| (name.as_str(), card))
            .collect()
    }
}

pub fn leaf_zones(zones: &[Zone]) -> Vec<&str> {
    let mut leaves = Vec::new();
    for zone in zones {
        if zone.zones.is_empty() {
            leaves.push(zone.name.as_str());
        } else {
            leaves.extend(leaf_zones(&zone.zones));
        }
    }
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::card::{FooterCard, FormCard, FormItem, ThemeName};

    fn meta() -> Card {
        Card::Meta(MetaCard {
            title: "Demo".to_string(),
            layout: vec![
                Zone::new("header"),
                Zone::new("main").row(vec![Zone::new("left"), Zone::new("right")]),
                Zone::new("footer"),
            ],
            theme: ThemeName::Dark,
        })
    }

    fn form(zone: &str) -> Card {
        Card::Form(FormCard {
            zone: zone.to_string(),
            items: vec![FormItem::text("x")],
        })
    }

    #[test]
    fn save_bumps_revision_and_snapshots_cards() {
        let mut page = Page::new();
        page.set("meta", meta()).expect("meta should be valid");
        page.set("left", form("left")).expect("form should be valid");

        let first = page.save();
        let second = page.save();
        assert_eq!(first.revision + 1, second.revision);
        assert_eq!(second.cards.len(), 2);
        assert!(second.card("left").is_some());
    }

    #[test]
    fn clear_removes_only_named_cards() {
        let mut page = Page::new();
        page.set("left", form("left")).expect("form should be valid");
        page.set("right", form("right")).expect("form should be valid");
        page.set(
            "footer",
            Card::Footer(FooterCard {
                zone: "footer".to_string(),
                caption: "c".to_string(),
            }),
        )
        .expect("footer should be valid");

        page.clear(&["left".to_string(), "right".to_string(), "missing".to_string()]);
        let names: Vec<_> = page.save().cards.into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["footer".to_string()]);
    }

    #[test]
    fn snapshot_groups_cards_by_zone() {
        let mut page = Page::new();
        page.set("meta", meta()).expect("meta should be valid");
        page.set("a", form("left")).expect("form should be valid");
        page.set("b", form("right")).expect("form should be valid");
        page.set("stray", form("nowhere")).expect("form should be valid");

        let snapshot = page.save();
        let left: Vec<_> = snapshot.cards_in_zone("left").map(|(name, _)| name).collect();
        assert_eq!(left, vec!["a"]);
        let unplaced: Vec<_> = snapshot.unplaced().into_iter().map(|(name, _)| name).collect();
        assert_eq!(unplaced, vec!["stray"]);
    }

    #[test]
    fn leaf_zones_flatten_nested_layouts() {
        let Card::Meta(meta) = meta() else {
            panic!("expected meta card");
        };
        assert_eq!(
            leaf_zones(&meta.layout),
            vec!["header", "left", "right", "footer"]
        );
    }
}
