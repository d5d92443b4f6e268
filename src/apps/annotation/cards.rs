use crate::apps::annotation::Tag;
use crate::ui::card::{
    AnnotatorItem, AnnotatorTag, Button, Card, Choice, FooterCard, FormCard, FormItem,
    HeaderCard, Justify, MetaCard, ThemeName, Zone,
};

pub const ENTITIES: &str = "image_entities";
pub const ANNOTATOR: &str = "image_annotator";
/// Field name of the annotator widget inside [`ANNOTATOR`].
pub const ANNOTATOR_FIELD: &str = "annotator";

const TAG_COLORS: [&str; 6] = ["#ff6b6b", "#4dabf7", "#51cf66", "#fcc419", "#cc5de8", "#ff922b"];

pub fn meta(theme: ThemeName) -> Card {
    Card::Meta(MetaCard {
        title: "Image Annotation".to_string(),
        layout: vec![
            Zone::new("header"),
            Zone::new("main").size("calc(100vh - 150px)").row(vec![
                Zone::new(ENTITIES).size("20%"),
                Zone::new(ANNOTATOR).size("70%"),
            ]),
            Zone::new("footer"),
        ],
        theme,
    })
}

pub fn header(dark: bool) -> Card {
    Card::Header(HeaderCard {
        zone: "header".to_string(),
        title: "Image Annotation".to_string(),
        subtitle: "Annotate images with bounding boxes for object detection".to_string(),
        icon: Some("Handwriting".to_string()),
        items: vec![FormItem::Toggle {
            name: "theme_dark".to_string(),
            label: "Dark Mode".to_string(),
            value: dark,
            trigger: true,
        }],
    })
}

pub fn footer() -> Card {
    Card::Footer(FooterCard {
        zone: "footer".to_string(),
        caption: "Boxes are stored per window and exported as CSV.".to_string(),
    })
}

fn centered(name: &str, label: &str) -> FormItem {
    FormItem::buttons(vec![Button::primary(name, label)], Justify::Center)
}

pub fn image_entities(tags: &[Tag]) -> Card {
    Card::Form(FormCard {
        zone: ENTITIES.to_string(),
        items: vec![
            FormItem::Textbox {
                name: "add_new_class".to_string(),
                label: "Add New Class".to_string(),
                value: None,
                suffix: None,
            },
            centered("add", "Add"),
            FormItem::Separator,
            FormItem::Dropdown {
                name: "delete_existing_class".to_string(),
                label: "Delete Existing Class".to_string(),
                value: None,
                choices: tags
                    .iter()
                    .map(|tag| Choice {
                        name: tag.name.clone(),
                        label: tag.label.clone(),
                    })
                    .collect(),
                trigger: false,
            },
            centered("delete", "Delete"),
            FormItem::Separator,
            FormItem::Textbox {
                name: "new_pixel_size".to_string(),
                label: "New Image Size [Integer]".to_string(),
                value: None,
                suffix: Some("px".to_string()),
            },
            centered("change_pixel", "Change Size"),
            FormItem::FileUpload {
                name: "file_upload".to_string(),
                label: "Click to Upload Custom Image!!".to_string(),
                multiple: true,
                extensions: vec!["png".to_string(), "jpg".to_string()],
            },
        ],
    })
}

pub fn image_annotator(
    tags: &[Tag],
    image: &str,
    items: &[AnnotatorItem],
    image_height: &str,
    export: Option<&str>,
) -> Card {
    let mut card_items = vec![
        FormItem::ImageAnnotator {
            name: ANNOTATOR_FIELD.to_string(),
            title: "Drag to annotate".to_string(),
            image: image.to_string(),
            items: items.to_vec(),
            tags: tags
                .iter()
                .enumerate()
                .map(|(index, tag)| AnnotatorTag {
                    name: tag.name.clone(),
                    label: tag.label.clone(),
                    color: TAG_COLORS[index % TAG_COLORS.len()].to_string(),
                })
                .collect(),
            image_height: Some(image_height.to_string()),
        },
        FormItem::buttons(
            vec![Button::primary("save_output", "Download Output CSV File")],
            Justify::Start,
        ),
    ];
    if let Some(url) = export {
        card_items.push(FormItem::Link {
            label: "Annotations CSV".to_string(),
            path: url.to_string(),
        });
    }

    Card::Form(FormCard {
        zone: ANNOTATOR.to_string(),
        items: card_items,
    })
}
