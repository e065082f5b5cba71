use super::connect::{
    CardTemplate,
    CreateModelParams,
};

/// Field order matters: anki treats the first field as the dedupe key and
/// the browser column, so Word leads.
pub const DEFAULT_FIELDS: &[&str] = &["Word", "Reading", "Definition", "Sentence", "Audio"];

const DEFAULT_CSS: &str = "\
.card {
    font-family: sans-serif;
    font-size: 22px;
    text-align: center;
    color: black;
    background-color: white;
}
.word {
    font-size: 40px;
}
.reading {
    color: #5c6bc0;
}
";

const CARD_FRONT: &str = "<div class=\"word\">{{Word}}</div>";

const CARD_BACK: &str = "\
{{FrontSide}}
<hr id=answer>
<div class=\"reading\">{{Reading}}</div>
<div>{{Definition}}</div>
<div>{{Sentence}}</div>
{{Audio}}";

/// The canned schema `create_default_note_type` installs when the user has
/// no note type of their own yet.
pub fn create_model_params(name: &str) -> CreateModelParams {
    CreateModelParams {
        model_name: name.to_string(),
        in_order_fields: DEFAULT_FIELDS.iter().map(|field| field.to_string()).collect(),
        css: DEFAULT_CSS.to_string(),
        is_cloze: false,
        card_templates: vec![CardTemplate {
            name: "Card 1".to_string(),
            front: CARD_FRONT.to_string(),
            back: CARD_BACK.to_string(),
        }],
    }
}
