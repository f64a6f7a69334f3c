//! Receipt to e-Archive invoice mapping.

use chrono::{DateTime, Utc};
use earsiv_common::money::{money_to_f64, round2};
use earsiv_common::Result;
use serde::Serialize;

use crate::etsy::{Receipt, Transaction};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveInvoice {
    pub recipient_type: String,
    pub invoice_number: String,
    pub id_fatura_external: String,
    pub company_id: f64,
    pub scenario_type: String,
    pub invoice_date: String,
    pub invoice_time: String,
    pub invoice_type: u8,
    pub order_date: String,
    pub order_number: String,
    pub receiver: Receiver,
    pub products: Vec<Product>,
    pub currency_code: String,
    pub total_line_extension_amount: f64,
    #[serde(rename = "TotalVATAmount")]
    pub total_vat_amount: f64,
    pub total_tax_inclusive_amount: f64,
    pub total_payable_amount: f64,
    pub send_mail_automatically: bool,
    pub web_selling_info: WebSellingInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Receiver {
    pub receiver_name: String,
    pub receiver_tax_code: String,
    pub recipient_type: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    pub boulevard_aveneu_street_name: String,
    pub town_name: String,
    pub city_name: String,
    pub postal_code: String,
    pub country_name: String,
    pub telephone_number: String,
    #[serde(rename = "EMail")]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub line_extension_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebSellingInfo {
    pub web_address: String,
    pub payment_mediator_name: String,
    pub payment_type: String,
    pub other_payment_type: String,
    pub payment_date: String,
    pub sending_date: String,
}

/// First `max` characters of an optional string.
fn truncated(value: Option<&str>, max: usize) -> String {
    value.unwrap_or_default().chars().take(max).collect()
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn vat(net: f64, rate: f64) -> f64 {
    round2(net * rate / 100.0)
}

/// Build the `SaveArchive` request for a receipt.
///
/// With transactions, each becomes a product line; without, the whole order
/// is invoiced as one line. `now` is used when the receipt has no timestamp.
pub fn build_archive_payload(
    settings: &Settings,
    receipt: &Receipt,
    transactions: &[Transaction],
    now: i64,
) -> Result<ArchiveInvoice> {
    let company_id = settings.luca_company_id_number()?;
    let kdv = settings.default_kdv_rate;

    let currency = receipt
        .currency()
        .map(str::to_string)
        .unwrap_or_else(|| settings.currency_fallback.clone());

    let address = Address {
        boulevard_aveneu_street_name: truncated(receipt.first_line.as_deref(), 250),
        town_name: truncated(receipt.city.as_deref(), 60),
        city_name: truncated(non_empty(&receipt.state).or(receipt.city.as_deref()), 60),
        postal_code: text(receipt.zip.as_deref()),
        country_name: text(non_empty(&receipt.country_name).or(receipt.country_iso.as_deref())),
        telephone_number: text(receipt.phone.as_deref()),
        email: text(receipt.buyer_email.as_deref()),
    };

    let receipt_key = receipt
        .receipt_key()
        .unwrap_or_else(|| "None".to_string());

    let mut total_net = 0.0;
    let products: Vec<Product> = if transactions.is_empty() {
        total_net = round2(receipt.total());
        vec![Product {
            product_name: format!("Etsy Order #{receipt_key}"),
            quantity: 1.0,
            unit_price: total_net,
            vat_rate: kdv,
            vat_amount: vat(total_net, kdv),
            line_extension_amount: total_net,
        }]
    } else {
        transactions
            .iter()
            .map(|tx| {
                let quantity = tx.quantity();
                let unit = money_to_f64(
                    tx.unit_money()
                        .or_else(|| receipt.total_price.as_ref()),
                );
                let line_net = round2(quantity * unit);
                total_net += line_net;
                Product {
                    product_name: tx.product_name(),
                    quantity,
                    unit_price: unit,
                    vat_rate: kdv,
                    vat_amount: vat(line_net, kdv),
                    line_extension_amount: line_net,
                }
            })
            .collect()
    };
    let total_net = round2(total_net);
    let total_vat = vat(total_net, kdv);
    let total_gross = round2(total_net + total_vat);

    let issued = DateTime::<Utc>::from_timestamp(receipt.invoice_epoch(now), 0)
        .unwrap_or_else(Utc::now);
    let day = issued.format("%Y-%m-%d").to_string();
    let time = issued.format("%H:%M:%S").to_string();

    let seller = receipt
        .seller_user_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    Ok(ArchiveInvoice {
        recipient_type: "NONE".to_string(),
        invoice_number: String::new(),
        id_fatura_external: receipt_key.clone(),
        company_id,
        scenario_type: "None".to_string(),
        invoice_date: day.clone(),
        invoice_time: time,
        invoice_type: 1,
        order_date: day.clone(),
        order_number: receipt_key,
        receiver: Receiver {
            receiver_name: receipt.buyer_name(),
            receiver_tax_code: String::new(),
            recipient_type: "NONE".to_string(),
            address,
        },
        products,
        currency_code: currency,
        total_line_extension_amount: total_net,
        total_vat_amount: total_vat,
        total_tax_inclusive_amount: total_gross,
        total_payable_amount: total_gross,
        send_mail_automatically: true,
        web_selling_info: WebSellingInfo {
            web_address: format!("https://www.etsy.com/shop/{seller}"),
            payment_mediator_name: "Etsy".to_string(),
            payment_type: "NONE".to_string(),
            other_payment_type: "Etsy Payments".to_string(),
            payment_date: day.clone(),
            sending_date: day,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingDefaults;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn settings(kdv: &str) -> Settings {
        let map: BTreeMap<String, String> = [
            ("luca_company_id", "1234"),
            ("default_kdv_rate", kdv),
            ("currency_fallback", "TRY"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Settings::from_map(&map, &SettingDefaults::default())
    }

    fn receipt(value: serde_json::Value) -> Receipt {
        Receipt::from_value(value).unwrap()
    }

    #[test]
    fn whole_order_line_without_transactions() {
        let r = receipt(json!({
            "receipt_id": 555,
            "name": "Jane Doe",
            "grandtotal": {"amount": 10000, "divisor": 100, "currency_code": "USD"},
            "updated_timestamp": 1_700_000_000,
            "seller_user_id": 77
        }));
        let p = build_archive_payload(&settings("20"), &r, &[], 0).unwrap();

        assert_eq!(p.products.len(), 1);
        assert_eq!(p.products[0].product_name, "Etsy Order #555");
        assert_eq!(p.products[0].unit_price, 100.0);
        assert_eq!(p.products[0].vat_amount, 20.0);
        assert_eq!(p.total_line_extension_amount, 100.0);
        assert_eq!(p.total_vat_amount, 20.0);
        assert_eq!(p.total_payable_amount, 120.0);
        assert_eq!(p.currency_code, "USD");
        assert_eq!(p.company_id, 1234.0);
        assert_eq!(p.invoice_date, "2023-11-14");
        assert_eq!(p.invoice_time, "22:13:20");
        assert_eq!(p.order_number, "555");
        assert_eq!(p.web_selling_info.web_address, "https://www.etsy.com/shop/77");
    }

    #[test]
    fn transaction_lines_and_rounding() {
        let r = receipt(json!({"receipt_id": 1, "created_timestamp": 86_400}));
        let txs: Vec<Transaction> = serde_json::from_value(json!([
            {"transaction_id": 1, "title": "Mug", "quantity": 3,
             "price": {"amount": 333, "divisor": 100}},
            {"transaction_id": 2, "quantity": 1, "amount_paid": 2.5}
        ]))
        .unwrap();

        let p = build_archive_payload(&settings("18"), &r, &txs, 0).unwrap();
        assert_eq!(p.products.len(), 2);
        assert_eq!(p.products[0].line_extension_amount, 9.99);
        assert_eq!(p.products[0].vat_amount, 1.8);
        assert_eq!(p.products[1].product_name, "Etsy Item #2");
        assert_eq!(p.products[1].unit_price, 2.5);
        assert_eq!(p.total_line_extension_amount, 12.49);
        assert_eq!(p.total_vat_amount, 2.25);
        assert_eq!(p.total_tax_inclusive_amount, 14.74);
        assert_eq!(p.currency_code, "TRY");
        assert_eq!(p.invoice_date, "1970-01-02");
    }

    #[test]
    fn address_fallbacks_and_truncation() {
        let r = receipt(json!({
            "receipt_id": 2,
            "first_line": "x".repeat(300),
            "city": "İstanbul",
            "country_iso": "TR",
            "buyer_email": "a@b.c"
        }));
        let p = build_archive_payload(&settings("0"), &r, &[], 10).unwrap();
        let a = &p.receiver.address;
        assert_eq!(a.boulevard_aveneu_street_name.chars().count(), 250);
        assert_eq!(a.town_name, "İstanbul");
        assert_eq!(a.city_name, "İstanbul");
        assert_eq!(a.country_name, "TR");
        assert_eq!(a.email, "a@b.c");
        assert_eq!(p.receiver.receiver_name, "Etsy Buyer");
    }

    #[test]
    fn serialized_field_names() {
        let r = receipt(json!({"receipt_id": 3}));
        let value = serde_json::to_value(build_archive_payload(&settings("0"), &r, &[], 0).unwrap())
            .unwrap();
        assert_eq!(value["RecipientType"], "NONE");
        assert_eq!(value["ScenarioType"], "None");
        assert_eq!(value["InvoiceType"], 1);
        assert_eq!(value["IdFaturaExternal"], "3");
        assert_eq!(value["TotalVATAmount"], 0.0);
        assert_eq!(value["Receiver"]["Address"]["EMail"], "");
        assert_eq!(value["WebSellingInfo"]["PaymentMediatorName"], "Etsy");
        assert_eq!(value["SendMailAutomatically"], true);
    }

    #[test]
    fn non_numeric_company_id_is_rejected() {
        let s = Settings::from_map(&BTreeMap::new(), &SettingDefaults::default());
        let err = build_archive_payload(&s, &Receipt::default(), &[], 0).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }
}
