//! `cloudflare_list_item` resources fold into their `cloudflare_list`.

use crate::list::{LIST_TYPE, REDIRECT_BOOLEANS};
use tfmigrate_core::{MergeField, MergeRule};

pub const LIST_ITEM_TYPE: &str = "cloudflare_list_item";

/// Items reference their list through `list_id`; the list's `kind` decides
/// which value field applies and `num_items` tracks the merged count.
pub fn list_item_rule() -> MergeRule {
    let mut redirect = vec![
        MergeField::scalar("source_url"),
        MergeField::scalar("target_url"),
    ];
    redirect.extend(REDIRECT_BOOLEANS.iter().map(|name| MergeField::boolean(*name)));
    redirect.push(MergeField::scalar("status_code"));

    MergeRule::new(LIST_ITEM_TYPE, LIST_TYPE, "items")
        .with_parent_ref("list_id")
        .with_parent_id("id")
        .with_count("num_items")
        .with_kind("kind")
        .with_field(MergeField::scalar("ip").for_kind("ip"))
        .with_field(MergeField::scalar("asn").for_kind("asn"))
        .with_field(
            MergeField::object("hostname", vec![MergeField::scalar("url_hostname")])
                .for_kind("hostname"),
        )
        .with_field(MergeField::object("redirect", redirect).for_kind("redirect"))
        .with_field(MergeField::scalar("comment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_per_kind() {
        let rule = list_item_rule();
        let names = |kind| {
            rule.fields_for(Some(kind))
                .map(|f| f.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names("ip"), vec!["ip", "comment"]);
        assert_eq!(names("redirect"), vec!["redirect", "comment"]);
        assert_eq!(rule.fields_for(None).count(), 5);
    }
}
