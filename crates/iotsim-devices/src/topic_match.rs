//! MQTT topic pattern matching: `+` matches exactly one level, `#` matches
//! the remainder of the topic (and must be the final filter segment).

pub fn matches(filter: &str, topic: &str) -> bool {
    let filter_parts: Vec<&str> = filter.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();

    let mut fi = 0;
    let mut ti = 0;
    while fi < filter_parts.len() {
        match filter_parts[fi] {
            "#" => return true,
            "+" => {
                if ti >= topic_parts.len() {
                    return false;
                }
                fi += 1;
                ti += 1;
            }
            literal => {
                if ti >= topic_parts.len() || topic_parts[ti] != literal {
                    return false;
                }
                fi += 1;
                ti += 1;
            }
        }
    }
    ti == topic_parts.len()
}
