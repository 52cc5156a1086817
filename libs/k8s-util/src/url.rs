/// Collapses a request path into a low-cardinality template for metric
/// labels.
///
/// The listener fans requests out across many logical clusters and virtual
/// workspace endpoints, so object names, namespaces and cluster paths are
/// replaced with placeholders: `/clusters/root:orgs/api/v1/secrets/token`
/// becomes `/clusters/{cluster}/api/v1/secrets/{name}`. Discovery endpoints
/// (`/openapi/...`, `/api`, `/apis`, `/version`) are already bounded and
/// kept as-is. Anything that does not look like an API server path maps to
/// `/{other}`.
pub fn template_path(path: &str) -> String {
    let trimmed = path.split('?').next().unwrap_or(path);
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());
    let mut rest: &[&str] = &segments;

    // kcp routing prefixes nest the regular api path under them
    loop {
        match rest {
            ["clusters", _, tail @ ..] => {
                out.push("clusters");
                out.push("{cluster}");
                rest = tail;
            }
            ["services", _, tail @ ..] => {
                out.push("services");
                out.push("{service}");
                rest = tail;
            }
            _ => break,
        }
    }

    let resources: &[&str] = match rest {
        [] => &[],
        ["openapi", tail @ ..] => {
            out.push("openapi");
            out.extend_from_slice(tail);
            &[]
        }
        ["version"] => {
            out.push("version");
            &[]
        }
        ["api"] => {
            out.push("api");
            &[]
        }
        ["apis"] => {
            out.push("apis");
            &[]
        }
        ["api", version, tail @ ..] => {
            out.push("api");
            out.push(version);
            tail
        }
        ["apis", group, version, tail @ ..] => {
            out.push("apis");
            out.push(group);
            out.push(version);
            tail
        }
        _ => return "/{other}".to_owned(),
    };

    let templated = match resources {
        ["namespaces", _, tail @ ..] => {
            out.push("namespaces");
            out.push("{namespace}");
            template_resource(&mut out, tail)
        }
        other => template_resource(&mut out, other),
    };
    if !templated {
        return "/{other}".to_owned();
    }
    format!("/{}", out.join("/"))
}

fn template_resource<'a>(out: &mut Vec<&'a str>, resources: &[&'a str]) -> bool {
    match resources {
        [] => true,
        [resource] => {
            out.push(resource);
            true
        }
        [resource, _name] => {
            out.push(resource);
            out.push("{name}");
            true
        }
        [resource, _name, subresource] => {
            out.push(resource);
            out.push("{name}");
            out.push(subresource);
            true
        }
        _ => false,
    }
}
