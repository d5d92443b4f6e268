use crate::apps::style_transfer::StyleUser;
use crate::ui::card::{
    Button, Card, Choice, FooterCard, FormCard, FormItem, HeaderCard, Justify, MetaCard,
    ThemeName, Zone,
};

pub const CONTROLS: &str = "controls";
pub const GALLERY: &str = "gallery";

pub fn meta() -> Card {
    Card::Meta(MetaCard {
        title: "Style Transfer".to_string(),
        layout: vec![
            Zone::new("header"),
            Zone::new("main").size("calc(100vh - 150px)").row(vec![
                Zone::new(CONTROLS).size("30%"),
                Zone::new(GALLERY).size("70%"),
            ]),
            Zone::new("footer"),
        ],
        theme: ThemeName::Dark,
    })
}

pub fn header() -> Card {
    Card::Header(HeaderCard {
        zone: "header".to_string(),
        title: "Neural Style Transfer".to_string(),
        subtitle: "Repaint a photo in the style of a famous artwork".to_string(),
        icon: Some("Color".to_string()),
        items: Vec::new(),
    })
}

pub fn footer() -> Card {
    Card::Footer(FooterCard {
        zone: "footer".to_string(),
        caption: "Styles are applied by a pretrained fast neural style network.".to_string(),
    })
}

fn label_for(name: &str) -> String {
    let stem = name.split('.').next().unwrap_or(name);
    stem.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn choices(names: &[&str]) -> Vec<Choice> {
    names
        .iter()
        .map(|name| Choice {
            name: name.to_string(),
            label: label_for(name),
        })
        .collect()
}

fn selected(value: Option<&str>, names: &[&str]) -> Option<String> {
    value
        .filter(|value| names.contains(value))
        .map(str::to_string)
}

pub fn controls(user: &StyleUser, models: &[&str], source_images: &[&str]) -> Card {
    let mut items = vec![
        FormItem::Dropdown {
            name: "source_img".to_string(),
            label: "Source image".to_string(),
            value: selected(
                user.source_img.as_deref().or(source_images.first().copied()),
                source_images,
            ),
            choices: choices(source_images),
            trigger: true,
        },
        FormItem::Dropdown {
            name: "style_model".to_string(),
            label: "Style".to_string(),
            value: selected(Some(user.style_model.as_str()), models),
            choices: choices(models),
            trigger: true,
        },
        FormItem::Separator,
        FormItem::Toggle {
            name: "try_your_image".to_string(),
            label: "Try your own image".to_string(),
            value: user.try_your_image,
            trigger: true,
        },
    ];
    if user.try_your_image {
        items.push(FormItem::FileUpload {
            name: "upload_image".to_string(),
            label: "Upload an image".to_string(),
            multiple: false,
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        });
    }
    items.push(FormItem::buttons(
        vec![Button::primary("apply_style", "Apply style")],
        Justify::Center,
    ));

    Card::Form(FormCard {
        zone: CONTROLS.to_string(),
        items,
    })
}

pub fn gallery(user: &StyleUser) -> Card {
    let mut items = vec![FormItem::Image {
        title: "Input".to_string(),
        path: user.input_image.clone(),
    }];
    if let Some(template) = &user.template_image_path {
        items.push(FormItem::Image {
            title: format!("Style: {}", label_for(&user.style_model)),
            path: template.clone(),
        });
    }
    match (&user.output_image, &user.style_name) {
        (Some(output), Some(style)) if user.apply_style => {
            items.push(FormItem::Image {
                title: format!("Output ({})", label_for(style)),
                path: output.clone(),
            });
        }
        _ => items.push(FormItem::text("Pick a style and press \"Apply style\".")),
    }

    Card::Form(FormCard {
        zone: GALLERY.to_string(),
        items,
    })
}
