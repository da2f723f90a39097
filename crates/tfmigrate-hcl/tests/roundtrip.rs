//! Parse and re-format real-world shaped configuration files.

use pretty_assertions::assert_eq;
use tfmigrate_hcl::{format_body, parse_body, rename_reference_in_body, Expression};

const CANONICAL: &str = r#"# Zone level settings
terraform {
  required_providers {
    cloudflare = {
      source  = "cloudflare/cloudflare"
      version = "~> 4.0"
    }
  }
}

variable "zone_id" {
  type = string
}

resource "cloudflare_record" "www" {
  zone_id = var.zone_id
  name    = "www"
  value   = "192.0.2.1"
  type    = "A"
  ttl     = 3600
  proxied = true # cached at the edge
}

resource "cloudflare_record" "srv" {
  count   = length(var.targets)
  zone_id = var.zone_id
  name    = "_sip._tcp.${var.domain}"
  type    = "SRV"

  data {
    service  = "_sip"
    proto    = "_tcp"
    priority = 0
    weight   = 0
    port     = 5060
    target   = var.targets[count.index]
  }
}

locals {
  rules = { for k, v in var.rules : k => v if v.enabled }
  ids   = concat(cloudflare_record.www[*].id, [for r in cloudflare_record.srv : r.id])
}
"#;

#[test]
fn test_canonical_file_is_stable() {
    let body = parse_body(CANONICAL).unwrap();
    assert_eq!(format_body(&body), CANONICAL);
}

#[test]
fn test_messy_input_is_canonicalized() {
    let messy = "resource \"cloudflare_record\" \"www\" {\n    zone_id=var.zone_id\nname =    \"www\"\n  value = \"192.0.2.1\"\n\n\n\n}\nresource \"cloudflare_zone\" \"z\" {\n zone = \"example.com\"\n}";
    let expected = "resource \"cloudflare_record\" \"www\" {\n  zone_id = var.zone_id\n  name    = \"www\"\n  value   = \"192.0.2.1\"\n}\n\nresource \"cloudflare_zone\" \"z\" {\n  zone = \"example.com\"\n}\n";

    let once = format_body(&parse_body(messy).unwrap());
    assert_eq!(once, expected);

    let twice = format_body(&parse_body(&once).unwrap());
    assert_eq!(twice, once);
}

#[test]
fn test_edit_preserves_untouched_blocks() {
    let mut body = parse_body(CANONICAL).unwrap();
    for block in body.blocks_mut() {
        if block.resource_name() == Some("www") {
            block.set_label(0, "cloudflare_dns_record");
            if let Some(value) = block.body.get_attribute_mut("value") {
                value.key = "content".to_string();
            }
        }
    }

    let out = format_body(&body);
    assert!(out.contains("resource \"cloudflare_dns_record\" \"www\" {"));
    assert!(out.contains("  content = \"192.0.2.1\""));
    assert!(out.contains("resource \"cloudflare_record\" \"srv\" {"));
    assert!(out.contains("proxied = true # cached at the edge"));
}

#[test]
fn test_values_are_reachable() {
    let body = parse_body(CANONICAL).unwrap();
    let srv = body
        .blocks()
        .find(|b| b.resource_name() == Some("srv"))
        .unwrap();
    let data = srv.body.blocks_of_type("data").next().unwrap();
    assert_eq!(
        data.body.get("port").and_then(Expression::as_number).and_then(|n| n.as_i64()),
        Some(5060)
    );
}

#[test]
fn test_parse_error_reports_location() {
    let source = "resource \"test\" {{{";
    let err = parse_body(source).unwrap_err();
    let rendered = err.format_with_source(source);
    assert!(rendered.contains("line 1:"));
    assert!(rendered.starts_with("error: expected attribute or block"));
}

const ANNOTATED: &str = r#"resource "cloudflare_list" "allow" {
  kind = "ip"
  ips = [
    # office
    "192.0.2.1",
    "192.0.2.2", # vpn

    /* partners */
    "198.51.100.0/24",
  ]
  labels = {
    // cost center
    team = "edge" # owner
  }
}

locals {
  hosts = <<EOT
%{ for name in cloudflare_record.www[*].name ~}
${name}
%{ endfor ~}
EOT
}
"#;

#[test]
fn test_comments_in_collections_are_stable() {
    let body = parse_body(ANNOTATED).unwrap();
    assert_eq!(format_body(&body), ANNOTATED);
}

#[test]
fn test_rename_reaches_template_directives() {
    let mut body = parse_body(ANNOTATED).unwrap();
    let renamed = rename_reference_in_body(
        &mut body,
        &["cloudflare_record", "www"],
        &["cloudflare_dns_record", "www"],
    );
    assert_eq!(renamed, 1);
    let out = format_body(&body);
    assert!(out.contains("%{ for name in cloudflare_dns_record.www[*].name ~}"));
}
