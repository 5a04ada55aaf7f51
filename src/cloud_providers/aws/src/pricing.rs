//! AWS Price List API access. `GetProducts` only serves from `us-east-1`
//! regardless of which region's prices are being requested, and returns each
//! product as an opaque JSON document string rather than a typed shape.

use aws_sdk_pricing::Client as PricingClient;
use lumina_common::model::{InstanceType, OperatingSystem, Region};
use std::collections::HashMap;

/// Human-readable location names the Pricing API's `location` filter expects,
/// keyed by region code. Unmapped regions are skipped rather than failing the
/// whole fetch, since new regions land in AWS before anyone updates this list.
fn location_name(region: &Region) -> Option<&'static str> {
    Some(match region.as_str() {
        "us-east-1" => "US East (N. Virginia)",
        "us-east-2" => "US East (Ohio)",
        "us-west-1" => "US West (N. California)",
        "us-west-2" => "US West (Oregon)",
        "eu-west-1" => "EU (Ireland)",
        "eu-west-2" => "EU (London)",
        "eu-central-1" => "EU (Frankfurt)",
        "ap-southeast-1" => "Asia Pacific (Singapore)",
        "ap-southeast-2" => "Asia Pacific (Sydney)",
        "ap-northeast-1" => "Asia Pacific (Tokyo)",
        "sa-east-1" => "South America (Sao Paulo)",
        _ => return None,
    })
}

fn operating_system_name(os: OperatingSystem) -> &'static str {
    match os {
        OperatingSystem::Linux => "Linux",
        OperatingSystem::Windows => "Windows",
        OperatingSystem::Rhel => "RHEL",
        OperatingSystem::Suse => "SUSE",
    }
}

/// One `(region, instance_type, os) -> USD/hour` on-demand rate, parsed out of
/// a Price List JSON document.
struct ParsedProduct {
    instance_type: InstanceType,
    rate: f64,
}

fn parse_on_demand_rate(document: &str) -> Option<ParsedProduct> {
    let value: serde_json::Value = serde_json::from_str(document).ok()?;
    let instance_type = value
        .get("product")?
        .get("attributes")?
        .get("instanceType")?
        .as_str()?;

    let on_demand = value.get("terms")?.get("OnDemand")?.as_object()?;
    let (_, term) = on_demand.iter().next()?;
    let price_dimensions = term.get("priceDimensions")?.as_object()?;
    let (_, dimension) = price_dimensions.iter().next()?;
    let usd = dimension
        .get("pricePerUnit")?
        .get("USD")?
        .as_str()?
        .parse::<f64>()
        .ok()?;

    Some(ParsedProduct {
        instance_type: InstanceType::from(instance_type),
        rate: usd,
    })
}

/// Fetches every on-demand, shared-tenancy, no-pre-installed-SQL product for
/// one `(region, os)` pair, paginating `GetProducts` to completion.
pub async fn fetch_on_demand_rates(
    client: &PricingClient,
    region: &Region,
    os: OperatingSystem,
) -> anyhow::Result<HashMap<InstanceType, f64>> {
    let Some(location) = location_name(region) else {
        return Ok(HashMap::new());
    };

    let mut rates = HashMap::new();
    let mut next_token: Option<String> = None;

    loop {
        let mut request = client
            .get_products()
            .service_code("AmazonEC2")
            .filters(
                aws_sdk_pricing::types::Filter::builder()
                    .r#type(aws_sdk_pricing::types::FilterType::TermMatch)
                    .field("location")
                    .value(location)
                    .build()?,
            )
            .filters(
                aws_sdk_pricing::types::Filter::builder()
                    .r#type(aws_sdk_pricing::types::FilterType::TermMatch)
                    .field("operatingSystem")
                    .value(operating_system_name(os))
                    .build()?,
            )
            .filters(
                aws_sdk_pricing::types::Filter::builder()
                    .r#type(aws_sdk_pricing::types::FilterType::TermMatch)
                    .field("tenancy")
                    .value("Shared")
                    .build()?,
            )
            .filters(
                aws_sdk_pricing::types::Filter::builder()
                    .r#type(aws_sdk_pricing::types::FilterType::TermMatch)
                    .field("preInstalledSw")
                    .value("NA")
                    .build()?,
            )
            .filters(
                aws_sdk_pricing::types::Filter::builder()
                    .r#type(aws_sdk_pricing::types::FilterType::TermMatch)
                    .field("capacitystatus")
                    .value("Used")
                    .build()?,
            );

        if let Some(token) = &next_token {
            request = request.next_token(token.clone());
        }

        let response = request.send().await?;

        for document in response.price_list() {
            if let Some(parsed) = parse_on_demand_rate(document) {
                rates.insert(parsed.instance_type, parsed.rate);
            }
        }

        next_token = response.next_token().map(|s| s.to_string());
        if next_token.is_none() {
            break;
        }
    }

    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PRODUCT: &str = r#"{
        "product": {
            "attributes": { "instanceType": "m5.xlarge" }
        },
        "terms": {
            "OnDemand": {
                "abc.JRTCKXETXF": {
                    "priceDimensions": {
                        "abc.JRTCKXETXF.6YS6EN2CT7": {
                            "pricePerUnit": { "USD": "0.1920000000" }
                        }
                    }
                }
            }
        }
    }"#;

    #[test]
    fn parses_rate_out_of_price_list_document() {
        let parsed = parse_on_demand_rate(SAMPLE_PRODUCT).expect("document should parse");
        assert_eq!(parsed.instance_type, InstanceType::from("m5.xlarge"));
        assert!((parsed.rate - 0.192).abs() < 1e-9);
    }

    #[test]
    fn malformed_document_yields_none() {
        assert!(parse_on_demand_rate("{}").is_none());
        assert!(parse_on_demand_rate("not json").is_none());
    }

    #[test]
    fn unmapped_region_maps_to_no_location() {
        assert_eq!(location_name(&"mars-central-1".to_string()), None);
        assert_eq!(location_name(&"us-west-2".to_string()), Some("US West (Oregon)"));
    }
}
