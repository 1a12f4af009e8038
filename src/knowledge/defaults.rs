//! Seed entries used when no knowledge base has been saved yet.

use super::types::KnowledgeEntry;

fn entry(id: &str, title: &str, category: &str, content: &str, sources: &str) -> KnowledgeEntry {
    KnowledgeEntry {
        id: id.into(),
        title: title.into(),
        content: content.into(),
        category: category.into(),
        sources: sources.into(),
    }
}

pub fn default_entries() -> Vec<KnowledgeEntry> {
    vec![
        entry(
            "kb-blood-pressure",
            "Blood Pressure Ranges",
            "cardiovascular",
            "## Adult blood pressure categories\n\n\
             - **Normal**: systolic below 120 and diastolic below 80 mmHg\n\
             - **Elevated**: systolic 120-129 and diastolic below 80 mmHg\n\
             - **Stage 1 hypertension**: systolic 130-139 or diastolic 80-89 mmHg\n\
             - **Stage 2 hypertension**: systolic 140+ or diastolic 90+ mmHg\n\n\
             Readings above 180/120 mmHg need immediate medical attention. Measure seated, \
             after five minutes of rest, with the arm supported at heart level.",
            "American Heart Association, 2017 ACC/AHA Hypertension Guideline",
        ),
        entry(
            "kb-sleep",
            "Sleep Duration and Quality",
            "sleep",
            "Adults aged 18-64 need **7-9 hours** of sleep per night; adults over 65 need 7-8. \
             Consistent sleep and wake times, a dark and cool bedroom, and avoiding caffeine \
             late in the day improve sleep quality. Persistent daytime sleepiness despite \
             adequate sleep time is worth discussing with a doctor.",
            "National Sleep Foundation; CDC Sleep and Sleep Disorders",
        ),
        entry(
            "kb-hydration",
            "Daily Hydration",
            "nutrition",
            "A common guideline is about **3.7 L** of total water per day for men and \
             **2.7 L** for women, including water from food. Needs rise with heat, exercise, \
             illness, pregnancy, and breastfeeding. Pale yellow urine is a practical sign of \
             adequate hydration.",
            "U.S. National Academies of Sciences, Engineering, and Medicine",
        ),
        entry(
            "kb-bmi",
            "Body Mass Index (BMI)",
            "weight",
            "BMI = weight (kg) / height (m)^2.\n\n\
             - Underweight: below 18.5\n\
             - Healthy weight: 18.5-24.9\n\
             - Overweight: 25.0-29.9\n\
             - Obesity: 30.0 and above\n\n\
             BMI does not distinguish muscle from fat; waist circumference adds useful context.",
            "World Health Organization; CDC Adult BMI Categories",
        ),
        entry(
            "kb-exercise",
            "Physical Activity Guidelines",
            "fitness",
            "Adults should aim for at least **150 minutes** of moderate-intensity or \
             **75 minutes** of vigorous-intensity aerobic exercise per week, plus \
             muscle-strengthening activity on two or more days. Any activity is better than \
             none, and benefits increase with more exercise.",
            "WHO Guidelines on Physical Activity and Sedentary Behaviour, 2020",
        ),
        entry(
            "kb-heart-rate",
            "Resting Heart Rate",
            "cardiovascular",
            "A normal resting heart rate for adults is **60-100 beats per minute**. Well-trained \
             athletes may sit between 40 and 60. A resting heart rate consistently above 100 \
             (tachycardia) or below 60 with dizziness or fatigue should be checked by a doctor.",
            "American Heart Association; Mayo Clinic",
        ),
    ]
}
