use crate::{
    predicate::{HeaderMatcher, Matcher, Predicate, StringMatch, METHOD, PATH},
    Unsupported,
};
use http::{HeaderName, Method};
use meshcfg_core::http_route::{HeaderMatch, HttpRouteMatch, PathMatch};

/// Builds the request predicate for an intention's route matches: the
/// disjunction of each match's conjoined clauses.
///
/// Returns `None` when the intention selects every request, either because it
/// has no route matches or because one of them sets no criteria.
pub(crate) fn route_permission(
    matches: &[HttpRouteMatch],
) -> Result<Option<Predicate>, Unsupported> {
    let clauses = matches
        .iter()
        .map(route_clauses)
        .collect::<Result<Vec<_>, _>>()?;

    if clauses.is_empty() || clauses.iter().any(Vec::is_empty) {
        return Ok(None);
    }

    Ok(Some(Predicate::any_of(
        clauses.into_iter().map(Predicate::all).collect(),
    )))
}

fn route_clauses(m: &HttpRouteMatch) -> Result<Vec<Predicate>, Unsupported> {
    let mut clauses = Vec::new();

    if let Some(path) = &m.path {
        let rule = match path {
            PathMatch::Exact(p) => StringMatch::Exact(p.clone()),
            PathMatch::Prefix(p) => StringMatch::Prefix(p.clone()),
            PathMatch::Regex(re) => StringMatch::regex(re)?,
        };
        clauses.push(header(PATH, rule, false));
    }

    for h in &m.headers {
        clauses.push(header_clause(h)?);
    }

    if !m.methods.is_empty() {
        let methods = m
            .methods
            .iter()
            .map(|s| -> Result<String, Unsupported> {
                let method = Method::from_bytes(s.as_bytes())
                    .map_err(|_| Unsupported::Method(s.clone()))?;
                Ok(regex::escape(method.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        clauses.push(header(METHOD, StringMatch::regex(&methods.join("|"))?, false));
    }

    Ok(clauses)
}

fn header_clause(h: &HeaderMatch) -> Result<Predicate, Unsupported> {
    let name = HeaderName::from_bytes(h.name.as_bytes())
        .map_err(|_| Unsupported::HeaderName(h.name.clone()))?;

    let mut rules = Vec::with_capacity(1);
    if h.present {
        rules.push(StringMatch::Present);
    }
    if let Some(v) = &h.exact {
        rules.push(StringMatch::Exact(v.clone()));
    }
    if let Some(v) = &h.prefix {
        rules.push(StringMatch::Prefix(v.clone()));
    }
    if let Some(v) = &h.suffix {
        rules.push(StringMatch::Suffix(v.clone()));
    }
    if let Some(re) = &h.regex {
        rules.push(StringMatch::regex(re)?);
    }

    match rules.pop() {
        Some(rule) if rules.is_empty() => Ok(header(name.as_str(), rule, h.invert)),
        _ => Err(Unsupported::HeaderMatchKind(h.name.clone())),
    }
}

fn header(name: &str, rule: StringMatch, invert: bool) -> Predicate {
    Matcher::Header(HeaderMatcher {
        name: name.to_string(),
        rule,
        invert,
    })
    .into()
}
