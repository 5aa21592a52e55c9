/*!
# Hamp DevKit - Stubs et Utilitaires pour tests du kernel

Bibliothèque facilitant les tests du kernel sans dépendre du vrai site upstream :
- Serveur HTTP stub qui sert des pages de laverie configurables
- Builder de pages HTML au format du tableau upstream
- Helpers d'attente pour tests asynchrones
*/

pub mod laundry_page;
pub mod test_utils;
pub mod upstream_stub;

pub use laundry_page::LaundryPageBuilder;
pub use test_utils::{init_logging, wait_until};
pub use upstream_stub::{StubPage, UpstreamStub};
