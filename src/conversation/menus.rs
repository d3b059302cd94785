use crate::conversation::command::{Command, ProductAction};
use crate::conversation::types::{Button, Draft, Keyboard};
use crate::db::models::{Category, Product};

pub const MAIN_MENU_TEXT: &str = "¡Hola Dueño! ¿Qué acción deseas realizar hoy?";

pub const HELP_TEXT: &str = "Comandos disponibles:
/start - Reinicia la conversación y muestra el menú principal
/status - Muestra el estado del catálogo
/help - Muestra esta ayuda

Para crear un producto envía una foto cuando no haya otra operación en curso.";

pub fn main_menu() -> Keyboard {
    vec![
        vec![Button::new("➕ Crear Producto", Command::Create)],
        vec![Button::new(
            "📝 Editar Producto",
            Command::ListProducts(ProductAction::Edit),
        )],
        vec![Button::new(
            "🚫 Desactivar",
            Command::ListProducts(ProductAction::Disable),
        )],
        vec![Button::new(
            "🗑️ Eliminar",
            Command::ListProducts(ProductAction::Delete),
        )],
    ]
}

pub fn description_review() -> Keyboard {
    vec![
        vec![Button::new("✅ Aprobar", Command::ApproveDescription)],
        vec![Button::new("✏️ Editar texto", Command::EditDescription)],
        vec![Button::new("🔄 Otra foto", Command::RetryDescription)],
    ]
}

/// Telegram rejects inline keyboards with more buttons than this.
pub const MAX_KEYBOARD_BUTTONS: usize = 100;

/// Lists at most `MAX_KEYBOARD_BUTTONS - 1` categories; the last button is
/// always "new category".
pub fn category_picker(categories: &[Category]) -> Keyboard {
    let mut rows: Keyboard = categories
        .iter()
        .take(MAX_KEYBOARD_BUTTONS - 1)
        .map(|category| {
            vec![Button::new(
                category.name.clone(),
                Command::SelectCategory(category.id),
            )]
        })
        .collect();
    rows.push(vec![Button::new("➕ Nueva categoría", Command::NewCategory)]);
    rows
}

pub fn product_picker(action: ProductAction, products: &[Product]) -> Keyboard {
    products
        .iter()
        .map(|product| {
            let label = if product.in_stock {
                product.name.clone()
            } else {
                format!("{} (inactivo)", product.name)
            };
            vec![Button::new(label, Command::Act(action, product.id))]
        })
        .collect()
}

pub fn final_confirmation() -> Keyboard {
    vec![vec![
        Button::new("✅ Publicar", Command::FinalConfirm),
        Button::new("❌ Cancelar", Command::FinalCancel),
    ]]
}

pub fn format_price(price: f64) -> String {
    format!("${price:.2}")
}

pub fn format_summary(draft: &Draft) -> String {
    let missing = "—";
    let mut summary = String::from("📝 Resumen del producto:\n");
    summary.push_str(&format!(
        "Nombre: {}\n",
        draft.name.as_deref().unwrap_or(missing)
    ));
    summary.push_str(&format!(
        "Precio: {}\n",
        draft
            .price
            .map(format_price)
            .unwrap_or_else(|| missing.to_string())
    ));
    summary.push_str(&format!(
        "Categoría: {}\n",
        draft.category_name.as_deref().unwrap_or(missing)
    ));
    if let Some(description) = draft.ai_description.as_deref() {
        summary.push_str(&format!("Descripción: {description}\n"));
    }
    if let Some(image_url) = draft.image_url.as_deref() {
        summary.push_str(&format!("Imagen: {image_url}\n"));
    }
    summary.push_str("\n¿Confirmas la publicación?");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_picker_always_offers_new_category() {
        let rows = category_picker(&[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].command, Command::NewCategory);

        let rows = category_picker(&[Category {
            id: 3,
            name: "Tazas".to_string(),
        }]);
        assert_eq!(rows[0][0].command, Command::SelectCategory(3));
        assert_eq!(rows[0][0].label, "Tazas");
    }

    #[test]
    fn category_picker_fits_the_keyboard_limit() {
        let categories: Vec<Category> = (1..=150)
            .map(|id| Category {
                id,
                name: format!("Categoría {id}"),
            })
            .collect();
        let rows = category_picker(&categories);
        assert_eq!(rows.iter().map(Vec::len).sum::<usize>(), MAX_KEYBOARD_BUTTONS);
        assert_eq!(rows[0][0].command, Command::SelectCategory(1));
        assert_eq!(rows.last().unwrap()[0].command, Command::NewCategory);
    }

    #[test]
    fn summary_lists_draft_fields() {
        let draft = Draft {
            name: Some("Taza Mágica".to_string()),
            price: Some(25.5),
            category_name: Some("Tazas".to_string()),
            ai_description: Some("Una taza que cambia de color.".to_string()),
            ..Draft::default()
        };
        let summary = format_summary(&draft);
        assert!(summary.contains("Nombre: Taza Mágica"));
        assert!(summary.contains("Precio: $25.50"));
        assert!(summary.contains("Categoría: Tazas"));
        assert!(summary.contains("cambia de color"));
        assert!(!summary.contains("Imagen:"));
    }
}
