//! The dialogue state machine.
//!
//! One call to [`Engine::advance`] handles one inbound event: it performs the
//! side effects the transition needs, in order, and returns where the
//! conversation ends up. Operator notices are best-effort; a failed send is
//! logged and never changes the transition, except for pickers: a state that
//! waits for a button is only entered once its buttons are on screen.
//!
//! Transitions that change the catalog first move the conversation to IDLE
//! under the version read at the start of the turn, so of two overlapping
//! turns only one reaches the catalog.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::conversation::command::{Command, ProductAction};
use crate::conversation::menus::{
    category_picker, description_review, final_confirmation, format_price, format_summary,
    main_menu, product_picker, HELP_TEXT, MAIN_MENU_TEXT,
};
use crate::conversation::ports::{RepositoryError, Services, StoreError};
use crate::conversation::types::{
    parse_price, validate_name, ConversationRecord, ConversationState, Draft, Event, Keyboard,
    NameError, Outcome,
};
use crate::llm::media::{image_content_type, object_key};

const USE_BUTTONS_TEXT: &str = "Por favor selecciona una opción del menú de arriba.";
const SEND_PHOTO_TEXT: &str = "Envía una foto para crear un producto o usa el menú /start.";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub recent_products_limit: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            recent_products_limit: 10,
        }
    }
}

pub struct Engine<'a> {
    services: &'a Services,
    settings: &'a EngineSettings,
    chat_id: i64,
}

impl<'a> Engine<'a> {
    pub fn new(services: &'a Services, settings: &'a EngineSettings, chat_id: i64) -> Self {
        Engine {
            services,
            settings,
            chat_id,
        }
    }

    pub async fn advance(&self, current: &ConversationRecord, event: Event) -> Outcome {
        match event {
            Event::Start => {
                self.say_with(MAIN_MENU_TEXT, main_menu()).await;
                Outcome::idle()
            }
            Event::Help => {
                self.say(HELP_TEXT).await;
                Outcome::unchanged(current)
            }
            Event::Status => {
                self.report_status().await;
                Outcome::unchanged(current)
            }
            Event::Command(Command::Create) => {
                self.say("Iniciando creación. 📸 Por favor, envía la foto del regalito.")
                    .await;
                Outcome::idle()
            }
            Event::Command(Command::ListProducts(action)) => {
                self.offer_products(current, action).await
            }
            event => self.on_state_event(current, event).await,
        }
    }

    async fn on_state_event(&self, current: &ConversationRecord, event: Event) -> Outcome {
        use ConversationState as S;

        let draft = &current.draft;
        match (current.state, event) {
            (S::Idle, Event::Image { file_id }) => self.receive_image(&file_id).await,
            (S::Idle, Event::Text(_)) => {
                self.say(SEND_PHOTO_TEXT).await;
                Outcome::unchanged(current)
            }

            (S::AwaitingApproval, Event::Command(Command::ApproveDescription)) => {
                self.say("¡Perfecto! Ahora dime, ¿cuál es el nombre de este regalo?")
                    .await;
                Outcome::to(S::AwaitingName, draft.clone())
            }
            (S::AwaitingApproval, Event::Command(Command::EditDescription)) => {
                self.say("Escribe la descripción que quieres usar para este producto.")
                    .await;
                Outcome::to(S::AwaitingManualEdit, draft.clone())
            }
            (S::AwaitingApproval, Event::Command(Command::RetryDescription)) => {
                self.say("De acuerdo. 📸 Envía otra foto del producto.").await;
                Outcome::idle()
            }

            (S::AwaitingManualEdit, Event::Text(text)) => {
                let description = text.trim();
                if description.is_empty() {
                    self.say("La descripción no puede estar vacía. Escríbela de nuevo.")
                        .await;
                    return Outcome::unchanged(current);
                }
                let mut next = draft.clone();
                next.ai_description = Some(description.to_string());
                self.say("Descripción actualizada. ¿Cuál es el nombre de este regalo?")
                    .await;
                Outcome::to(S::AwaitingName, next)
            }

            (S::AwaitingName, Event::Text(text)) => match validate_name(&text) {
                Ok(name) => {
                    self.say(&format!("Nombre: {name}. Ahora, ¿cuál es el precio?"))
                        .await;
                    let mut next = draft.clone();
                    next.name = Some(name);
                    Outcome::to(S::AwaitingPrice, next)
                }
                Err(err) => {
                    self.say(name_error_text(err, NameSubject::Product)).await;
                    Outcome::unchanged(current)
                }
            },

            (S::AwaitingPrice, Event::Text(text)) => match parse_price(&text) {
                Some(price) => self.offer_categories(current, price).await,
                None => {
                    self.say("Por favor envía un número válido (por ejemplo 19.99).")
                        .await;
                    Outcome::unchanged(current)
                }
            },

            (S::SelectingCategory, Event::Command(Command::SelectCategory(id))) => {
                self.select_category(current, id).await
            }
            (S::SelectingCategory, Event::Command(Command::NewCategory)) => {
                self.say("Escribe el nombre de la nueva categoría.").await;
                Outcome::to(S::AwaitingNewCategoryName, draft.clone())
            }

            (S::AwaitingNewCategoryName, Event::Text(text)) => {
                self.create_category(current, &text).await
            }

            (S::AwaitingFinalConfirmation, Event::Command(Command::FinalConfirm)) => {
                self.publish(current).await
            }
            (S::AwaitingFinalConfirmation, Event::Command(Command::FinalCancel)) => {
                self.say("❌ Creación cancelada. El borrador fue descartado.").await;
                Outcome::idle()
            }

            (state, Event::Command(Command::Act(action, product_id)))
                if state.selection_action() == Some(action) =>
            {
                self.apply_product_action(current, action, product_id).await
            }

            (state, Event::Text(_) | Event::Image { .. }) if state.awaits_button() => {
                self.say(USE_BUTTONS_TEXT).await;
                Outcome::unchanged(current)
            }
            (state, Event::Image { .. }) if state.awaits_text() => {
                self.say("Estoy esperando un texto. Escribe tu respuesta o usa /start para reiniciar.")
                    .await;
                Outcome::unchanged(current)
            }
            (state, Event::Command(command)) => {
                // Stale or replayed button presses land here and are ignored.
                debug!(
                    "Ignoring command {} in state {}",
                    command,
                    state.as_str()
                );
                Outcome::unchanged(current)
            }
            (state, event) => {
                debug!(
                    "No transition for {} event in state {}",
                    event.kind(),
                    state.as_str()
                );
                Outcome::unchanged(current)
            }
        }
    }

    async fn receive_image(&self, file_id: &str) -> Outcome {
        let services = self.services;
        self.say("📸 ¡Foto recibida! Subiendo imagen y generando una descripción...")
            .await;

        let file_url = match services.gateway.resolve_file_url(file_id).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                self.say("No pude localizar la foto en Telegram. Envíala de nuevo.")
                    .await;
                return Outcome::idle();
            }
            Err(err) => {
                warn!("Resolving file {} failed: {}", file_id, err);
                self.say("No pude obtener la foto de Telegram. Envíala de nuevo.")
                    .await;
                return Outcome::idle();
            }
        };

        let bytes = match services.gateway.fetch_bytes(&file_url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Downloading file {} failed: {}", file_id, err);
                self.say("No pude descargar la foto. Envíala de nuevo.").await;
                return Outcome::idle();
            }
        };

        let content_type = image_content_type(&bytes);
        let key = object_key(Utc::now(), &content_type);
        let image_url = match services
            .media
            .store(bytes.clone(), &key, &content_type)
            .await
        {
            Ok(url) => url,
            Err(StoreError::BucketMissing { bucket }) => {
                error!("Storage bucket '{}' is missing; resetting conversation", bucket);
                self.say(&format!(
                    "⚠️ Error de configuración: el bucket de almacenamiento '{bucket}' no existe. \
                     Créalo en el panel de almacenamiento y vuelve a enviar la foto."
                ))
                .await;
                return Outcome::idle();
            }
            Err(StoreError::NotConfigured) => {
                error!("Object storage is not configured; resetting conversation");
                self.say(
                    "⚠️ Error de configuración: el almacenamiento de imágenes no está configurado \
                     (SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY).",
                )
                .await;
                return Outcome::idle();
            }
            Err(err) => {
                warn!("Upload of {} failed: {}", key, err);
                self.say(&format!("Error subiendo imagen: {err}. Envía la foto de nuevo."))
                    .await;
                return Outcome::idle();
            }
        };
        info!("Stored product image at {}", image_url);

        let description = match services.generator.describe(&bytes, &content_type).await {
            Ok(description) => description,
            Err(err) => {
                warn!("Description generation failed: {}", err);
                self.say(&format!(
                    "No pude generar la descripción ({err}). Envía la foto de nuevo."
                ))
                .await;
                return Outcome::idle();
            }
        };

        self.say_with(
            &format!("✨ Descripción sugerida:\n\n{description}\n\n¿Qué deseas hacer?"),
            description_review(),
        )
        .await;

        Outcome::to(
            ConversationState::AwaitingApproval,
            Draft {
                image_url: Some(image_url),
                ai_description: Some(description),
                ..Draft::default()
            },
        )
    }

    async fn offer_categories(&self, current: &ConversationRecord, price: f64) -> Outcome {
        let categories = match self.services.catalog.list_categories().await {
            Ok(categories) => categories,
            Err(err) => {
                warn!("Listing categories failed: {}", err);
                self.say(&format!(
                    "⚠️ No pude cargar las categorías ({err}). Envía el precio de nuevo."
                ))
                .await;
                return Outcome::unchanged(current);
            }
        };

        let shown = self
            .say_with(
                &format!("Precio: {}. Selecciona la categoría:", format_price(price)),
                category_picker(&categories),
            )
            .await;
        if !shown {
            return Outcome::unchanged(current);
        }

        let mut next = current.draft.clone();
        next.price = Some(price);
        Outcome::to(ConversationState::SelectingCategory, next)
    }

    async fn select_category(&self, current: &ConversationRecord, category_id: i64) -> Outcome {
        match self.services.catalog.get_category(category_id).await {
            Ok(Some(category)) => {
                let mut next = current.draft.clone();
                next.category_id = Some(category.id);
                next.category_name = Some(category.name);
                self.confirm(next).await
            }
            Ok(None) => {
                self.say("Esa categoría ya no existe. Elige otra del menú de arriba.")
                    .await;
                Outcome::unchanged(current)
            }
            Err(err) => {
                warn!("Loading category {} failed: {}", category_id, err);
                self.say(&format!(
                    "⚠️ No pude leer la categoría ({err}). Inténtalo de nuevo."
                ))
                .await;
                Outcome::unchanged(current)
            }
        }
    }

    async fn create_category(&self, current: &ConversationRecord, text: &str) -> Outcome {
        let name = match validate_name(text) {
            Ok(name) => name,
            Err(err) => {
                self.say(name_error_text(err, NameSubject::Category))
                    .await;
                return Outcome::unchanged(current);
            }
        };

        match self.services.catalog.insert_category(&name).await {
            Ok(category) => {
                info!("Category '{}' ready with id {}", category.name, category.id);
                let mut next = current.draft.clone();
                next.category_id = Some(category.id);
                next.category_name = Some(category.name);
                self.confirm(next).await
            }
            Err(err) => {
                warn!("Creating category '{}' failed: {}", name, err);
                self.say(&format!(
                    "⚠️ No pude crear la categoría ({err}). Escribe el nombre de nuevo."
                ))
                .await;
                Outcome::unchanged(current)
            }
        }
    }

    async fn confirm(&self, draft: Draft) -> Outcome {
        self.say_with(&format_summary(&draft), final_confirmation())
            .await;
        Outcome::to(ConversationState::AwaitingFinalConfirmation, draft)
    }

    async fn publish(&self, current: &ConversationRecord) -> Outcome {
        let product = match current.draft.to_new_product() {
            Ok(product) => product,
            Err(err) => {
                warn!("Refusing to publish incomplete draft: {}", err);
                self.say("⚠️ El borrador está incompleto. Empieza de nuevo con /start.")
                    .await;
                return Outcome::idle();
            }
        };

        let version = match self.settle(current).await {
            Ok(version) => version,
            Err(outcome) => return outcome,
        };

        match self.services.catalog.insert_product(&product).await {
            Ok(id) => {
                info!("Published product {} ('{}')", id, product.name);
                self.say("✅ Producto guardado con éxito").await;
            }
            Err(err) => {
                error!("Publishing product '{}' failed: {}", product.name, err);
                self.say(&format!("Error DB: {err}")).await;
            }
        }
        Outcome::written(version)
    }

    /// Persists IDLE conditional on `current.version` ahead of a catalog
    /// change. `Err` carries the outcome to return without touching the catalog.
    async fn settle(&self, current: &ConversationRecord) -> Result<i64, Outcome> {
        let idle = current.advanced(Outcome::idle());
        match self.services.conversations.save_conversation(&idle).await {
            Ok(version) => Ok(version),
            Err(RepositoryError::Conflict { expected_version }) => {
                warn!(
                    "Conversation left version {} before the catalog change; skipping it",
                    expected_version
                );
                Err(Outcome::superseded(current))
            }
            Err(err) => {
                warn!("Saving conversation before a catalog change failed: {}", err);
                self.say(&format!(
                    "⚠️ No pude guardar el estado de la conversación ({err}). Inténtalo de nuevo."
                ))
                .await;
                Err(Outcome::unchanged(current))
            }
        }
    }

    async fn offer_products(&self, current: &ConversationRecord, action: ProductAction) -> Outcome {
        self.say("Buscando productos en la base de datos...").await;

        let products = match self
            .services
            .catalog
            .list_recent_products(self.settings.recent_products_limit)
            .await
        {
            Ok(products) => products,
            Err(err) => {
                warn!("Listing products failed: {}", err);
                self.say(&format!(
                    "⚠️ No puedo acceder a la tabla de productos. {err}"
                ))
                .await;
                return Outcome::unchanged(current);
            }
        };

        if products.is_empty() {
            self.say("No se encontraron productos.").await;
            return Outcome::idle();
        }

        let shown = self
            .say_with(
                &format!("Selecciona el producto a {}:", action.verb()),
                product_picker(action, &products),
            )
            .await;
        if !shown {
            return Outcome::unchanged(current);
        }
        Outcome::to(ConversationState::for_selection(action), Draft::default())
    }

    async fn apply_product_action(
        &self,
        current: &ConversationRecord,
        action: ProductAction,
        product_id: i64,
    ) -> Outcome {
        let catalog = &self.services.catalog;

        if action == ProductAction::Edit {
            self.say("🛠️ La edición de productos todavía no está implementada.")
                .await;
            return Outcome::idle();
        }

        let product = match catalog.get_product(product_id).await {
            Ok(product) => product,
            Err(err) => {
                warn!("Loading product {} failed: {}", product_id, err);
                self.say(&format!("⚠️ No pude leer el producto ({err}). Inténtalo de nuevo."))
                    .await;
                return Outcome::unchanged(current);
            }
        };
        let label = product
            .map(|product| product.name)
            .unwrap_or_else(|| product_id.to_string());

        let version = match self.settle(current).await {
            Ok(version) => version,
            Err(outcome) => return outcome,
        };

        let result = match action {
            ProductAction::Disable => catalog.set_in_stock(product_id, false).await,
            _ => catalog.delete_product(product_id).await,
        };

        match result {
            Ok(true) => {
                info!("Applied {:?} to product {}", action, product_id);
                let text = match action {
                    ProductAction::Disable => format!("✅ Producto {label} desactivado."),
                    _ => format!("🗑️ Producto {label} eliminado."),
                };
                self.say(&text).await;
            }
            Ok(false) => {
                self.say(&format!("No encontré el producto {label}. Puede que ya no exista."))
                    .await;
            }
            Err(err) => {
                warn!("Applying {:?} to product {} failed: {}", action, product_id, err);
                self.say(&format!(
                    "⚠️ No pude {} el producto ({err}). Vuelve a intentarlo desde /start.",
                    action.verb()
                ))
                .await;
            }
        }
        Outcome::written(version)
    }

    async fn report_status(&self) {
        let count = match self.services.catalog.count_products().await {
            Ok(count) => count.to_string(),
            Err(err) => {
                warn!("Counting products failed: {}", err);
                "Error".to_string()
            }
        };
        self.say(&format!("✅ Estado Operativo. Productos: {count}."))
            .await;
    }

    async fn say(&self, text: &str) {
        self.send(text, None).await;
    }

    /// Returns `false` when the message, and so its buttons, never arrived.
    async fn say_with(&self, text: &str, keyboard: Keyboard) -> bool {
        self.send(text, Some(keyboard)).await
    }

    async fn send(&self, text: &str, keyboard: Option<Keyboard>) -> bool {
        match self
            .services
            .gateway
            .send_text(self.chat_id, text, keyboard)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to notify chat {}: {}", self.chat_id, err);
                false
            }
        }
    }
}

fn name_error_text(err: NameError, subject: NameSubject) -> &'static str {
    match (subject, err) {
        (NameSubject::Product, NameError::Empty) => {
            "El nombre no puede estar vacío. Escríbelo de nuevo."
        }
        (NameSubject::Product, NameError::TooLong) => {
            "El nombre es demasiado largo (máximo 255 caracteres). Escríbelo de nuevo."
        }
        (NameSubject::Category, NameError::Empty) => {
            "El nombre de la categoría no puede estar vacío. Escríbelo de nuevo."
        }
        (NameSubject::Category, NameError::TooLong) => {
            "El nombre de la categoría es demasiado largo (máximo 255 caracteres)."
        }
    }
}

#[derive(Clone, Copy)]
enum NameSubject {
    Product,
    Category,
}
