// src/services/prompt_builder.rs
//
// Turns the structured builder form into the request text sent to the
// architect assistant, plus the small text rules around it.

use crate::models::generation::BuilderData;

pub const IMAGE_TO_IMAGE_TASK: &str = "Image to Image";
pub const BUILDER_PLACEHOLDER_TEXT: &str = "Generating prompt from Builder configuration...";
pub const WELCOME_MESSAGE: &str = "Hello! I'm your AI Architectural Assistant. I can help you brainstorm concepts, find design references, or create detailed prompts for rendering. How can I help you today?";

const OTHER_STYLE: &str = "Other";
const DEFAULT_STYLE: &str = "Modern";
const DEFAULT_MOOD: &str = "Sunny bright day";
const TITLE_MAX_CHARS: usize = 30;
const REALISM_PREFIX: &str =
    "Photorealistic rendering, architectural photography, 8k resolution, highly detailed. ";

pub fn construct_prompt(data: &BuilderData) -> String {
    let mut styles: Vec<&str> = data.arch_style.iter().map(String::as_str).collect();
    if styles.contains(&OTHER_STYLE) {
        styles.retain(|style| *style != OTHER_STYLE);
        if !data.arch_style_custom.is_empty() {
            styles.push(&data.arch_style_custom);
        }
    }
    let style_final = if styles.is_empty() {
        DEFAULT_STYLE.to_string()
    } else {
        styles.join(", ")
    };

    let mood_final = if data.mood.is_empty() {
        DEFAULT_MOOD.to_string()
    } else {
        data.mood.join(", ")
    };

    let explicit_command = if data.task == IMAGE_TO_IMAGE_TASK {
        "Turn this image to photorealistic. "
    } else {
        ""
    };

    let building = if data.building_type.is_empty() {
        "Unspecified"
    } else {
        &data.building_type
    };

    format!(
        "Please generate a professional architectural prompt based on these specifications:\n\n\
         1. TASK & OBJECT: {explicit_command}{task}, Building: {building}\n\
         2. MATERIAL & ARCHITECTURE: Style: Photo Realistic, Architecture: {style_final}, Roof: {roof}, Wall: {wall}, Ground: {ground}\n\
         3. CONTEXT & ACTIVITY: Ref Type: {reference}, Context: {context}\n\
         4. MOOD & TECHNICAL: Mood: {mood_final}, Camera: {camera}, View: {view}, Focal: {focal}, Lens: {lens}, DoF: {dof}\n",
        task = data.task,
        roof = data.roof_mat,
        wall = data.wall_mat,
        ground = data.ground_mat,
        reference = data.reference,
        context = data.context,
        camera = data.camera,
        view = data.view,
        focal = data.focal,
        lens = data.lens,
        dof = data.dof,
    )
}

/// Appended when an image is attached to an "Image to Image" builder request.
pub fn image_to_image_directive(prompt: &str) -> String {
    format!(
        "{}\n\nSYSTEM: The user has provided an image and specific Prompt Builder requirements. \
         Analyze the image geometry/composition but enforce the Prompt Builder styles/materials/mood in the final output string.",
        prompt
    )
}

/// Session title taken from the first user message.
pub fn derive_title(text: &str) -> String {
    let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
    if text.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

pub fn enhance_visualizer_prompt(prompt: &str) -> String {
    if prompt.to_lowercase().contains("realistic") {
        prompt.to_string()
    } else {
        format!("{}{}", REALISM_PREFIX, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builder_prompt() {
        let prompt = construct_prompt(&BuilderData::default());
        assert!(prompt.contains("1. TASK & OBJECT: Text to Image, Building: Unspecified"));
        assert!(prompt.contains("Architecture: Modern,"));
        assert!(prompt.contains("Mood: Sunny bright day, Camera: Sony A7R V"));
        assert!(prompt.contains("Focal: 35mm, Lens: Normal lens, DoF: No"));
        assert!(!prompt.contains("Turn this image"));
    }

    #[test]
    fn test_other_style_is_replaced_by_custom_value() {
        let data = BuilderData {
            arch_style: vec!["Brutalist".to_string(), "Other".to_string()],
            arch_style_custom: "Parametric".to_string(),
            ..BuilderData::default()
        };
        assert!(construct_prompt(&data).contains("Architecture: Brutalist, Parametric,"));

        let data = BuilderData {
            arch_style: vec!["Other".to_string()],
            arch_style_custom: String::new(),
            ..BuilderData::default()
        };
        assert!(construct_prompt(&data).contains("Architecture: Modern,"));
    }

    #[test]
    fn test_empty_moods_fall_back() {
        let data = BuilderData {
            mood: vec![],
            ..BuilderData::default()
        };
        assert!(construct_prompt(&data).contains("Mood: Sunny bright day,"));

        let data = BuilderData {
            mood: vec!["Golden hour".to_string(), "Foggy".to_string()],
            ..BuilderData::default()
        };
        assert!(construct_prompt(&data).contains("Mood: Golden hour, Foggy,"));
    }

    #[test]
    fn test_image_to_image_task() {
        let data = BuilderData {
            task: IMAGE_TO_IMAGE_TASK.to_string(),
            building_type: "Library".to_string(),
            ..BuilderData::default()
        };
        assert!(construct_prompt(&data).contains(
            "1. TASK & OBJECT: Turn this image to photorealistic. Image to Image, Building: Library"
        ));

        let directed = image_to_image_directive("base");
        assert!(directed.starts_with("base\n\nSYSTEM:"));
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("Short question"), "Short question");
        assert_eq!(
            derive_title("Design a timber pavilion for a lakeside park"),
            "Design a timber pavilion for a..."
        );
        assert_eq!(derive_title(&"x".repeat(30)), "x".repeat(30));
    }

    #[test]
    fn test_enhance_visualizer_prompt() {
        assert_eq!(
            enhance_visualizer_prompt("A hyper-Realistic villa"),
            "A hyper-Realistic villa"
        );
        assert!(enhance_visualizer_prompt("A villa").starts_with("Photorealistic rendering"));
        assert!(enhance_visualizer_prompt("A villa").ends_with("highly detailed. A villa"));
    }
}
