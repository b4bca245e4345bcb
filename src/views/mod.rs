use std::fmt::Write;

use crate::models::{Additive, AnalysisResponse, InteractionState};

pub const DEFAULT_TITLE: &str = "Resultado del Análisis";
pub const NO_ADDITIVES_MESSAGE: &str = "No se detectaron aditivos en esta imagen.";

/// Display treatment for a safety rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingStyle {
    pub css_class: &'static str,
    pub glyph: &'static str,
}

const RATING_STYLES: [(&str, RatingStyle); 3] = [
    ("SAFE", RatingStyle { css_class: "rating-safe", glyph: "✅" }),
    ("CAUTION", RatingStyle { css_class: "rating-caution", glyph: "⚠️" }),
    ("AVOID", RatingStyle { css_class: "rating-avoid", glyph: "🚫" }),
];

pub const UNKNOWN_RATING: RatingStyle = RatingStyle {
    css_class: "rating-unknown",
    glyph: "❔",
};

pub fn rating_style(rating: &str) -> RatingStyle {
    RATING_STYLES
        .iter()
        .find(|(label, _)| *label == rating)
        .map(|(_, style)| *style)
        .unwrap_or(UNKNOWN_RATING)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditiveCard {
    pub name: String,
    pub code: Option<String>,
    pub purpose: String,
    pub fda_status: String,
    pub health_risks: Vec<String>,
    pub fda_source: String,
    pub academic_source: String,
    pub rating: String,
    pub style: RatingStyle,
}

impl AdditiveCard {
    fn from_additive(additive: &Additive) -> Self {
        let rating = additive.safety_rating.as_str();
        Self {
            name: additive.name.clone(),
            code: additive.code.clone(),
            purpose: additive.purpose.clone(),
            fda_status: additive.fda_status.clone(),
            health_risks: additive.health_risks.clone(),
            fda_source: additive.sources.fda.clone(),
            academic_source: additive.sources.academic.clone(),
            rating: rating.to_string(),
            style: rating_style(rating),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub title: String,
    pub summary: String,
    /// Same order the service reported them in.
    pub cards: Vec<AdditiveCard>,
}

impl ResultView {
    pub fn from_response(response: &AnalysisResponse) -> Self {
        let title = response
            .product_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        Self {
            title,
            summary: response.summary.clone(),
            cards: response.additives.iter().map(AdditiveCard::from_additive).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// The screen shown for each interaction state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Capture,
    Analyzing,
    Result(ResultView),
    NoAdditives(ResultView),
    Error(String),
}

impl View {
    pub fn for_state(state: &InteractionState) -> Self {
        match state {
            InteractionState::Idle => View::Capture,
            InteractionState::Analyzing => View::Analyzing,
            InteractionState::Result(response) => {
                let view = ResultView::from_response(response);
                if view.is_empty() {
                    View::NoAdditives(view)
                } else {
                    View::Result(view)
                }
            }
            InteractionState::Error(message) => View::Error(message.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            View::Capture => "capture",
            View::Analyzing => "analyzing",
            View::Result(_) => "result",
            View::NoAdditives(_) => "empty",
            View::Error(_) => "error",
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_header(html: &mut String, view: &ResultView) {
    let _ = write!(
        html,
        "<div class=\"summary\"><h2>{}</h2>\
         <button data-action=\"reset\">Nueva Consulta</button>\
         <p class=\"quote\">\"{}\"</p></div>",
        escape(&view.title),
        escape(&view.summary)
    );
}

fn render_card(html: &mut String, card: &AdditiveCard) {
    let _ = write!(
        html,
        "<article class=\"additive\"><div class=\"badge {}\">\
         <span class=\"glyph\">{}</span><span class=\"rating\">{}</span>",
        card.style.css_class,
        card.style.glyph,
        escape(&card.rating)
    );
    if let Some(code) = &card.code {
        let _ = write!(html, "<span class=\"code\">{}</span>", escape(code));
    }
    let _ = write!(
        html,
        "</div><div class=\"details\"><h3>{}</h3><p class=\"purpose\">{}</p>\
         <div class=\"fda\"><h4>Estatus FDA</h4><p>{}</p></div>\
         <h4>Riesgos Potenciales</h4><ul class=\"risks\">",
        escape(&card.name),
        escape(&card.purpose),
        escape(&card.fda_status)
    );
    for risk in &card.health_risks {
        let _ = write!(html, "<li>{}</li>", escape(risk));
    }
    let _ = write!(
        html,
        "</ul><div class=\"sources\">\
         <div><h4>Fuente FDA</h4><p>{}</p></div>\
         <div><h4>Fuente Tesis/Estudio</h4><p><em>{}</em></p></div>\
         </div></div></article>",
        escape(&card.fda_source),
        escape(&card.academic_source)
    );
}

/// HTML fragment for the browser page.
pub fn render_html(view: &View) -> String {
    let mut html = format!("<section class=\"view\" data-view=\"{}\">", view.name());

    match view {
        View::Capture => {
            html.push_str(
                "<h2>Escanea tu producto</h2>\
                 <p>Captura la lista de ingredientes para identificar aditivos y sus posibles \
                 efectos en la salud según la FDA y la academia.</p>\
                 <p class=\"hint\">Enfoca los ingredientes</p>",
            );
        }
        View::Analyzing => {
            html.push_str(
                "<div class=\"spinner\"></div><p class=\"pulse\">Analizando ingredientes...</p>",
            );
        }
        View::Result(result) => {
            render_header(&mut html, result);
            html.push_str("<div class=\"cards\">");
            for card in &result.cards {
                render_card(&mut html, card);
            }
            html.push_str("</div>");
        }
        View::NoAdditives(result) => {
            render_header(&mut html, result);
            let _ = write!(
                html,
                "<div class=\"empty\"><p>{}</p>\
                 <button data-action=\"reset\">Intentar de nuevo</button></div>",
                NO_ADDITIVES_MESSAGE
            );
        }
        View::Error(message) => {
            let _ = write!(
                html,
                "<div class=\"error\"><h3>Ups, algo salió mal</h3><p>{}</p>\
                 <button data-action=\"reset\">Reintentar escaneo</button></div>",
                escape(message)
            );
        }
    }

    html.push_str("</section>");
    html
}

/// Plain-text rendering for the terminal.
pub fn render_text(view: &View) -> String {
    match view {
        View::Capture => "📷 Escanea tu producto: enfoca la lista de ingredientes.".to_string(),
        View::Analyzing => "⏳ Analizando ingredientes...".to_string(),
        View::Error(message) => format!("❌ *Ups, algo salió mal*\n{}", message),
        View::NoAdditives(result) => format!(
            "🧾 *{}*\n\"{}\"\n\n{}",
            result.title, result.summary, NO_ADDITIVES_MESSAGE
        ),
        View::Result(result) => {
            let mut text = format!("🧾 *{}*\n\"{}\"\n", result.title, result.summary);
            for card in &result.cards {
                let code = card.code.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default();
                let _ = write!(
                    text,
                    "\n{} {} · *{}*{}\n{}\nEstatus FDA: {}\n",
                    card.style.glyph, card.rating, card.name, code, card.purpose, card.fda_status
                );
                if !card.health_risks.is_empty() {
                    text.push_str("Riesgos Potenciales:\n");
                    for risk in &card.health_risks {
                        let _ = writeln!(text, "  • {}", risk);
                    }
                }
                let _ = writeln!(text, "Fuente FDA: {}", card.fda_source);
                let _ = writeln!(text, "Fuente Tesis/Estudio: {}", card.academic_source);
            }
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SafetyRating, Sources};
    use std::sync::Arc;

    fn additive(name: &str, rating: SafetyRating, risks: &[&str]) -> Additive {
        Additive {
            name: name.to_string(),
            code: None,
            purpose: "Conservante".to_string(),
            fda_status: "GRAS".to_string(),
            health_risks: risks.iter().map(|r| r.to_string()).collect(),
            sources: Sources {
                fda: "FDA".to_string(),
                academic: "Estudio".to_string(),
            },
            safety_rating: rating,
        }
    }

    fn response(additives: Vec<Additive>) -> AnalysisResponse {
        AnalysisResponse {
            product_name: Some("Jugo <Naranja>".to_string()),
            summary: "Resumen".to_string(),
            additives,
        }
    }

    #[test]
    fn test_rating_table_is_bijective() {
        let styles: Vec<RatingStyle> = SafetyRating::ALL
            .iter()
            .map(|r| rating_style(r.as_str()))
            .collect();

        assert!(!styles.contains(&UNKNOWN_RATING));
        for (i, a) in styles.iter().enumerate() {
            for b in &styles[i + 1..] {
                assert_ne!(a.css_class, b.css_class);
                assert_ne!(a.glyph, b.glyph);
            }
        }
        assert_eq!(rating_style("AVOID").glyph, "🚫");
    }

    #[test]
    fn test_unknown_rating_falls_back() {
        for rating in ["", "safe", "DANGER", "🚫"] {
            assert_eq!(rating_style(rating), UNKNOWN_RATING);
        }
    }

    #[test]
    fn test_cards_keep_input_order() {
        let names = ["Tartrazina", "Aspartamo", "Goma xantana"];
        let additives = names
            .iter()
            .map(|n| additive(n, SafetyRating::Caution, &[]))
            .collect();
        let view = ResultView::from_response(&response(additives));

        assert_eq!(view.cards.len(), 3);
        let rendered: Vec<&str> = view.cards.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(rendered, names);

        let html = render_html(&View::Result(view));
        assert_eq!(html.matches("<article class=\"additive\">").count(), 3);
        let positions: Vec<usize> = names.iter().map(|n| html.find(n).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_additives_view_is_distinct_from_error() {
        let state = InteractionState::Result(Arc::new(response(vec![])));
        let view = View::for_state(&state);

        assert!(matches!(view, View::NoAdditives(_)));
        let html = render_html(&view);
        assert!(html.contains(NO_ADDITIVES_MESSAGE));
        assert!(html.contains("Intentar de nuevo"));
        assert!(html.contains("data-action=\"reset\""));
        assert!(!html.contains("Ups, algo salió mal"));
    }

    #[test]
    fn test_avoid_card_lists_risks_in_order() {
        let state = InteractionState::Result(Arc::new(response(vec![additive(
            "Nitrito de sodio",
            SafetyRating::Avoid,
            &["Nitrosaminas", "Cáncer colorrectal"],
        )])));
        let html = render_html(&View::for_state(&state));

        assert_eq!(html.matches("<article").count(), 1);
        assert!(html.contains("rating-avoid"));
        assert!(html.contains("🚫"));
        assert!(html.contains("<ul class=\"risks\"><li>Nitrosaminas</li><li>Cáncer colorrectal</li></ul>"));
    }

    #[test]
    fn test_title_fallback_and_escaping() {
        let mut unnamed = response(vec![]);
        unnamed.product_name = Some("  ".to_string());
        assert_eq!(ResultView::from_response(&unnamed).title, DEFAULT_TITLE);

        let html = render_html(&View::Result(ResultView::from_response(&response(vec![additive(
            "A",
            SafetyRating::Safe,
            &[],
        )]))));
        assert!(html.contains("Jugo &lt;Naranja&gt;"));
    }

    #[test]
    fn test_text_rendering() {
        let mut item = additive("Benzoato de sodio", SafetyRating::Caution, &["Benceno"]);
        item.code = Some("E211".to_string());
        let text = render_text(&View::Result(ResultView::from_response(&response(vec![item]))));

        assert!(text.contains("⚠️ CAUTION · *Benzoato de sodio* (E211)"));
        assert!(text.contains("  • Benceno"));
        assert_eq!(
            render_text(&View::Error("falló".to_string())),
            "❌ *Ups, algo salió mal*\nfalló"
        );
    }
}
