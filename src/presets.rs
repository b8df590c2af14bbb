//! Built-in domain configurations.
//!
//! Each preset is an ordinary [`DomainConfig`]; `--init-domain` writes one
//! out as TOML so it can be tuned per business. Tier labels and messages
//! are in Spanish, matching the dashboards they feed.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::analysis::{BreakdownOrder, BreakdownSpec};
use crate::domain::{DomainConfig, SavingsConfig, TierSpec};
use crate::recommendation::{
    DefaultRecommendation, ImpactEstimate, RecommendationRule, RuleCondition,
};
use crate::record::MetricSource;

/// Cash amount that makes a payment reportable.
pub const DEFAULT_CASH_THRESHOLD: f64 = 10_000.0;

/// The built-in domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Expiry,
    Pricing,
    Payments,
    Scheduling,
    Customers,
    Inventory,
    Returns,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Expiry,
        Domain::Pricing,
        Domain::Payments,
        Domain::Scheduling,
        Domain::Customers,
        Domain::Inventory,
        Domain::Returns,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Domain::Expiry => "expiry",
            Domain::Pricing => "pricing",
            Domain::Payments => "payments",
            Domain::Scheduling => "scheduling",
            Domain::Customers => "customers",
            Domain::Inventory => "inventory",
            Domain::Returns => "returns",
        }
    }

    /// Preset configuration with default parameters.
    pub fn config(&self) -> DomainConfig {
        self.config_with(&PresetOptions::default())
    }

    pub fn config_with(&self, options: &PresetOptions) -> DomainConfig {
        match self {
            Domain::Expiry => expiry_control(),
            Domain::Pricing => pricing_discounts(),
            Domain::Payments => payment_risk(options.cash_threshold),
            Domain::Scheduling => scheduling_patterns(),
            Domain::Customers => customer_segmentation(),
            Domain::Inventory => inventory_cover(),
            Domain::Returns => returns_rate(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters some presets take.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetOptions {
    pub cash_threshold: f64,
}

impl Default for PresetOptions {
    fn default() -> Self {
        Self {
            cash_threshold: DEFAULT_CASH_THRESHOLD,
        }
    }
}

fn rule(
    rec_type: &str,
    priority: u32,
    when: RuleCondition,
    message: &str,
    action: &str,
    impact: ImpactEstimate,
) -> RecommendationRule {
    RecommendationRule {
        rec_type: rec_type.to_string(),
        priority,
        when,
        message: message.to_string(),
        action: action.to_string(),
        impact,
    }
}

fn closing(message: &str, action: &str) -> DefaultRecommendation {
    DefaultRecommendation {
        rec_type: "preventive".to_string(),
        message: message.to_string(),
        action: action.to_string(),
        impact: ImpactEstimate::None,
    }
}

fn count_at_least(tier: &str, count: usize) -> RuleCondition {
    RuleCondition::TierCountAtLeast {
        tier: tier.to_string(),
        count,
    }
}

fn tier_sum(tier: &str, factor: f64) -> ImpactEstimate {
    ImpactEstimate::TierSum {
        tier: tier.to_string(),
        factor,
    }
}

fn weights(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(label, weight)| (label.to_string(), *weight))
        .collect()
}

/// Lots by days until expiry.
pub fn expiry_control() -> DomainConfig {
    DomainConfig {
        name: "expiry".to_string(),
        description: "Lotes por días hasta el vencimiento".to_string(),
        value_field: "lot_value".to_string(),
        entity_field: "lot_id".to_string(),
        flag_through_rank: None,
        metric: MetricSource::DaysUntil {
            field: "expiry_date".to_string(),
        },
        tiers: vec![
            TierSpec::at_most("Vencido", 0.0),
            TierSpec::at_most("Crítico", 3.0),
            TierSpec::at_most("Urgente", 7.0),
            TierSpec::at_most("RiesgoMedio", 15.0),
            TierSpec::at_most("Preventivo", 30.0),
            TierSpec::catch_all("Normal"),
        ],
        breakdown: Some(BreakdownSpec {
            field: "category".to_string(),
            top_n: 5,
            order_by: BreakdownOrder::Count,
        }),
        savings: SavingsConfig {
            average_unit_value: 100.0,
            loss_weights: weights(&[("Vencido", 1.0), ("Crítico", 0.7), ("Urgente", 0.4)]),
        },
        rules: vec![
            rule(
                "expired_stock",
                1,
                count_at_least("Vencido", 1),
                "{count:Vencido} lotes vencidos por ${sum:Vencido}.",
                "Retirar del punto de venta y registrar la merma",
                tier_sum("Vencido", 1.0),
            ),
            rule(
                "critical_expiry",
                1,
                count_at_least("Crítico", 1),
                "{count:Crítico} lotes vencen en 3 días o menos ({pct:Crítico}% del inventario).",
                "Aplicar descuentos de liquidación",
                tier_sum("Crítico", 0.7),
            ),
            rule(
                "urgent_volume",
                2,
                RuleCondition::TierPercentageAtLeast {
                    tier: "Urgente".to_string(),
                    percentage: 20.0,
                },
                "Alto volumen de lotes urgentes: {count:Urgente} ({pct:Urgente}%).",
                "Priorizar rotación FEFO",
                tier_sum("Urgente", 0.4),
            ),
            rule(
                "category_concentration",
                3,
                RuleCondition::TopShareAtLeast { percentage: 40.0 },
                "La categoría {top_key} concentra {top_share}% de los lotes en riesgo.",
                "Revisar compras de {top_key}",
                ImpactEstimate::None,
            ),
            rule(
                "data_quality",
                4,
                RuleCondition::UnclassifiableAtLeast { count: 1 },
                "{unclassifiable} lotes sin fecha de vencimiento válida.",
                "Completar fechas de vencimiento",
                ImpactEstimate::None,
            ),
        ],
        default_recommendation: closing(
            "Mantener el control preventivo: {flagged_count} lotes en seguimiento, ahorro potencial ${savings}.",
            "Revisar vencimientos semanalmente",
        ),
    }
}

/// Sale lines by discount over subtotal.
pub fn pricing_discounts() -> DomainConfig {
    DomainConfig {
        name: "pricing".to_string(),
        description: "Ventas por porcentaje de descuento".to_string(),
        value_field: "discount_amount".to_string(),
        entity_field: "product_id".to_string(),
        flag_through_rank: None,
        metric: MetricSource::Ratio {
            numerator: "discount_amount".to_string(),
            denominator: "subtotal".to_string(),
        },
        tiers: vec![
            TierSpec::at_least("MuyAlto", 50.0),
            TierSpec::at_least("Alto", 30.0),
            TierSpec::at_least("Medio", 20.0),
            TierSpec::at_least("Bajo", 10.0),
            TierSpec::catch_all("Mínimo"),
        ],
        breakdown: Some(BreakdownSpec {
            field: "product_name".to_string(),
            top_n: 10,
            order_by: BreakdownOrder::Sum,
        }),
        savings: SavingsConfig {
            average_unit_value: 25.0,
            loss_weights: weights(&[("MuyAlto", 1.0), ("Alto", 0.5)]),
        },
        rules: vec![
            rule(
                "excessive_discounts",
                1,
                count_at_least("MuyAlto", 1),
                "{count:MuyAlto} ventas con descuento de 50% o más (${sum:MuyAlto} descontados).",
                "Exigir autorización para descuentos mayores a 50%",
                tier_sum("MuyAlto", 0.5),
            ),
            rule(
                "high_discount_share",
                2,
                RuleCondition::Any {
                    conditions: vec![
                        RuleCondition::TierPercentageAtLeast {
                            tier: "Alto".to_string(),
                            percentage: 25.0,
                        },
                        RuleCondition::TierPercentageAtLeast {
                            tier: "MuyAlto".to_string(),
                            percentage: 10.0,
                        },
                    ],
                },
                "Los descuentos altos representan una parte relevante de las ventas ({pct:Alto}% Alto, {pct:MuyAlto}% MuyAlto).",
                "Revisar la política de descuentos",
                ImpactEstimate::Savings { factor: 1.0 },
            ),
            rule(
                "product_concentration",
                3,
                RuleCondition::TopShareAtLeast { percentage: 30.0 },
                "El producto {top_key} acumula ${top_sum} en descuentos.",
                "Evaluar el precio de lista de {top_key}",
                ImpactEstimate::None,
            ),
        ],
        default_recommendation: closing(
            "Descuentos bajo control: {flagged_pct}% de las ventas con descuento de 10% o más.",
            "Monitorear descuentos mensualmente",
        ),
    }
}

/// Cash payments against a reporting threshold.
pub fn payment_risk(threshold: f64) -> DomainConfig {
    DomainConfig {
        name: "payments".to_string(),
        description: format!("Pagos en efectivo frente al umbral de {:.0}", threshold),
        value_field: "total".to_string(),
        entity_field: "transaction_id".to_string(),
        flag_through_rank: None,
        metric: MetricSource::Field {
            field: "total".to_string(),
        },
        tiers: vec![
            TierSpec::at_least("Elevado", threshold * 5.0),
            TierSpec::at_least("Reportable", threshold),
            TierSpec::catch_all("BajoUmbral"),
        ],
        breakdown: Some(BreakdownSpec {
            field: "customer_id".to_string(),
            top_n: 5,
            order_by: BreakdownOrder::Sum,
        }),
        savings: SavingsConfig::default(),
        rules: vec![
            rule(
                "high_value_cash",
                1,
                count_at_least("Elevado", 1),
                &format!(
                    "{{count:Elevado}} pagos en efectivo de {:.0} o más (${{sum:Elevado}}).",
                    threshold * 5.0
                ),
                "Verificar identidad y origen de fondos",
                ImpactEstimate::None,
            ),
            rule(
                "reportable_cash",
                1,
                RuleCondition::FlaggedCountAtLeast { count: 1 },
                &format!(
                    "{{flagged_count}} pagos en efectivo superan {:.0} por ${{flagged_sum}}.",
                    threshold
                ),
                "Preparar el reporte de operaciones en efectivo",
                ImpactEstimate::None,
            ),
            rule(
                "repeat_customer",
                2,
                RuleCondition::All {
                    conditions: vec![
                        RuleCondition::FlaggedCountAtLeast { count: 2 },
                        RuleCondition::TopShareAtLeast { percentage: 50.0 },
                    ],
                },
                "El cliente {top_key} concentra {top_share}% de los pagos reportables.",
                "Revisar posible fraccionamiento de operaciones",
                ImpactEstimate::None,
            ),
        ],
        default_recommendation: closing(
            "Sin alertas relevantes en {total} pagos en efectivo.",
            "Monitorear pagos en efectivo",
        ),
    }
}

/// Hours by share of daily transactions.
pub fn scheduling_patterns() -> DomainConfig {
    DomainConfig {
        name: "scheduling".to_string(),
        description: "Horas por participación en las transacciones del día".to_string(),
        value_field: "transactions".to_string(),
        entity_field: "hour".to_string(),
        flag_through_rank: Some(1),
        metric: MetricSource::ShareOfTotal {
            field: "transactions".to_string(),
        },
        tiers: vec![
            TierSpec::at_least("Pico", 15.0),
            TierSpec::at_least("Alto", 10.0),
            TierSpec::at_least("Normal", 5.0),
            TierSpec::at_least("Bajo", 2.0),
            TierSpec::catch_all("Valle"),
        ],
        breakdown: None,
        savings: SavingsConfig::default(),
        rules: vec![
            rule(
                "peak_staffing",
                1,
                count_at_least("Pico", 1),
                "{count:Pico} horas pico concentran {sum:Pico} transacciones.",
                "Reforzar personal en horas pico",
                ImpactEstimate::None,
            ),
            rule(
                "idle_hours",
                3,
                count_at_least("Valle", 3),
                "{count:Valle} horas valle con menos de 2% de las transacciones.",
                "Evaluar promociones o ajustar horarios",
                ImpactEstimate::None,
            ),
        ],
        default_recommendation: closing(
            "Distribución horaria estable: {flagged_count} horas de alta demanda.",
            "Revisar patrones horarios mensualmente",
        ),
    }
}

/// Customers by purchase frequency.
pub fn customer_segmentation() -> DomainConfig {
    DomainConfig {
        name: "customers".to_string(),
        description: "Clientes por frecuencia de compra".to_string(),
        value_field: "total_spent".to_string(),
        entity_field: "customer_id".to_string(),
        flag_through_rank: Some(0),
        metric: MetricSource::Field {
            field: "purchase_count".to_string(),
        },
        tiers: vec![
            TierSpec::at_least("VIP", 20.0),
            TierSpec::at_least("Frecuente", 10.0),
            TierSpec::at_least("Ocasional", 4.0),
            TierSpec::catch_all("Esporádico"),
        ],
        breakdown: None,
        savings: SavingsConfig::default(),
        rules: vec![
            rule(
                "vip_retention",
                1,
                count_at_least("VIP", 1),
                "{count:VIP} clientes VIP generan ${sum:VIP}.",
                "Lanzar un programa de fidelización",
                ImpactEstimate::None,
            ),
            rule(
                "reactivation",
                2,
                RuleCondition::TierPercentageAtLeast {
                    tier: "Esporádico".to_string(),
                    percentage: 50.0,
                },
                "{pct:Esporádico}% de los clientes compra de forma esporádica.",
                "Campaña de reactivación",
                ImpactEstimate::None,
            ),
        ],
        default_recommendation: closing(
            "Base de {classified} clientes segmentada.",
            "Actualizar la segmentación mensualmente",
        ),
    }
}

/// Products by days of stock cover.
pub fn inventory_cover() -> DomainConfig {
    DomainConfig {
        name: "inventory".to_string(),
        description: "Productos por días de cobertura de stock".to_string(),
        value_field: "stock_value".to_string(),
        entity_field: "product_id".to_string(),
        flag_through_rank: None,
        metric: MetricSource::Field {
            field: "days_of_cover".to_string(),
        },
        tiers: vec![
            TierSpec::at_most("Agotado", 0.0),
            TierSpec::at_most("Crítico", 3.0),
            TierSpec::at_most("Bajo", 7.0),
            TierSpec::at_most("Vigilar", 15.0),
            TierSpec::catch_all("Normal"),
        ],
        breakdown: Some(BreakdownSpec {
            field: "category".to_string(),
            top_n: 5,
            order_by: BreakdownOrder::Count,
        }),
        savings: SavingsConfig {
            average_unit_value: 80.0,
            loss_weights: weights(&[("Agotado", 1.0), ("Crítico", 0.5), ("Bajo", 0.2)]),
        },
        rules: vec![
            rule(
                "stockout",
                1,
                count_at_least("Agotado", 1),
                "{count:Agotado} productos agotados.",
                "Generar órdenes de compra urgentes",
                ImpactEstimate::TierCount {
                    tier: "Agotado".to_string(),
                    unit_value: 80.0,
                    factor: 1.0,
                },
            ),
            rule(
                "critical_reorder",
                1,
                count_at_least("Crítico", 1),
                "{count:Crítico} productos con 3 días de cobertura o menos.",
                "Reponer antes del fin de semana",
                ImpactEstimate::TierCount {
                    tier: "Crítico".to_string(),
                    unit_value: 80.0,
                    factor: 0.5,
                },
            ),
            rule(
                "category_gap",
                3,
                RuleCondition::TopShareAtLeast { percentage: 40.0 },
                "La categoría {top_key} reúne {top_share}% de los quiebres de stock.",
                "Revisar el punto de reorden de {top_key}",
                ImpactEstimate::None,
            ),
        ],
        default_recommendation: closing(
            "Cobertura de stock adecuada: {flagged_count} productos a vigilar.",
            "Revisar niveles de stock semanalmente",
        ),
    }
}

/// Products by return rate.
pub fn returns_rate() -> DomainConfig {
    DomainConfig {
        name: "returns".to_string(),
        description: "Productos por tasa de devolución".to_string(),
        value_field: "returned_amount".to_string(),
        entity_field: "product_id".to_string(),
        flag_through_rank: None,
        metric: MetricSource::Ratio {
            numerator: "returned_units".to_string(),
            denominator: "sold_units".to_string(),
        },
        tiers: vec![
            TierSpec::at_least("Crítico", 20.0),
            TierSpec::at_least("Alto", 10.0),
            TierSpec::at_least("Moderado", 5.0),
            TierSpec::catch_all("Normal"),
        ],
        breakdown: Some(BreakdownSpec {
            field: "return_reason".to_string(),
            top_n: 5,
            order_by: BreakdownOrder::Count,
        }),
        savings: SavingsConfig {
            average_unit_value: 40.0,
            loss_weights: weights(&[("Crítico", 1.0), ("Alto", 0.5)]),
        },
        rules: vec![
            rule(
                "critical_returns",
                1,
                count_at_least("Crítico", 1),
                "{count:Crítico} productos con tasa de devolución de 20% o más (${sum:Crítico}).",
                "Auditar calidad con el proveedor",
                tier_sum("Crítico", 1.0),
            ),
            rule(
                "dominant_reason",
                2,
                RuleCondition::TopShareAtLeast { percentage: 50.0 },
                "El motivo \"{top_key}\" explica {top_share}% de las devoluciones relevantes.",
                "Atacar la causa principal de devolución",
                ImpactEstimate::Savings { factor: 0.5 },
            ),
        ],
        default_recommendation: closing(
            "Devoluciones dentro de rango: {flagged_count} productos a revisar.",
            "Revisar devoluciones mensualmente",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotAssembler;

    #[test]
    fn test_every_preset_is_valid() {
        for domain in Domain::ALL {
            let config = domain.config();
            assert_eq!(config.name, domain.name());
            assert!(
                SnapshotAssembler::new(&config).is_ok(),
                "preset {} failed validation",
                domain
            );
        }
    }

    #[test]
    fn test_presets_survive_toml() {
        for domain in Domain::ALL {
            let config = domain.config();
            let text = config.to_toml().unwrap();
            assert_eq!(DomainConfig::from_toml_str(&text).unwrap(), config);
        }
    }

    #[test]
    fn test_payment_threshold() {
        let config = payment_risk(5_000.0);
        assert_eq!(config.tiers[0].at_least, Some(25_000.0));
        assert_eq!(config.tiers[1].at_least, Some(5_000.0));
        assert!(config.rules[1].message.contains("5000"));
        assert!(SnapshotAssembler::new(&config).is_ok());
    }
}
