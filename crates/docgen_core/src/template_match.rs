use crate::contract::DOCUMENT_EXTENSION;

/// Whether a store entry is the requested template.
///
/// The name comparison folds Unicode case; the extension check is ASCII
/// case-insensitive. The name may be given either as the full entry key or
/// relative to `template_folder`.
pub fn template_matches(entry_key: &str, template_name: &str, template_folder: &str) -> bool {
    if !has_document_extension(entry_key) {
        return false;
    }

    if eq_ignore_case(entry_key, template_name) {
        return true;
    }

    strip_prefix_ignore_case(entry_key, template_folder)
        .is_some_and(|relative| !relative.is_empty() && eq_ignore_case(relative, template_name))
}

pub fn has_document_extension(key: &str) -> bool {
    let extension_len = DOCUMENT_EXTENSION.len();
    key.len() >= extension_len
        && key.is_char_boundary(key.len() - extension_len)
        && key[key.len() - extension_len..].eq_ignore_ascii_case(DOCUMENT_EXTENSION)
}

/// First entry in store order that matches. Iteration stops at the first
/// hit; later entries are never inspected.
pub fn select_template<T, I, F>(
    entries: I,
    key_of: F,
    template_name: &str,
    template_folder: &str,
) -> Option<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &str,
{
    entries
        .into_iter()
        .find(|entry| template_matches(key_of(entry), template_name, template_folder))
}

fn fold_case(value: &str) -> impl Iterator<Item = char> + '_ {
    value.chars().flat_map(char::to_lowercase)
}

fn eq_ignore_case(left: &str, right: &str) -> bool {
    fold_case(left).eq(fold_case(right))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let folded_prefix: String = fold_case(prefix).collect();
    let mut folded = String::with_capacity(folded_prefix.len());
    for (index, ch) in value.char_indices() {
        if folded.len() >= folded_prefix.len() {
            return (folded == folded_prefix).then(|| &value[index..]);
        }
        folded.extend(ch.to_lowercase());
        if !folded_prefix.starts_with(folded.as_str()) {
            return None;
        }
    }
    (folded == folded_prefix).then_some("")
}
