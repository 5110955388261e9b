/*!
# VitalWatch DevKit - Outils de développement et de test

Bibliothèque facilitant les tests et la démo du kernel avec:
- Builders de payloads télémétrie (format `vitalwatch/telemetry@v1`)
- Corps de formulaires inscription/login
- Simulateur de bracelets (constantes plausibles + anomalies)
*/

pub mod forms;
pub mod payloads;
pub mod simulator;

pub use payloads::TelemetryBuilder;
pub use simulator::Wearable;
